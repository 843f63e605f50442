use std::{collections::BTreeMap, sync::Arc};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use tower::ServiceExt;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Price")]
    pub price: f64,
}

#[derive(Deserialize)]
pub struct NewProduct {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Price", default)]
    pub price: f64,
}

#[derive(Deserialize)]
pub struct ProductPatch {
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Price")]
    pub price: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct Store {
    next_id: u32,
    products: BTreeMap<u32, Product>,
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    router(Arc::new(RwLock::new(Store::default())))
}

pub fn router(db: Db) -> Router {
    Router::new()
        .route("/$batch", post(batch))
        .route("/{segment}", get(read).post(create).patch(update).delete(remove))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// The resource a path segment such as `Products` or `Products(3)` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Collection,
    Entity(u32),
}

fn parse_segment(segment: &str) -> Option<Target> {
    if segment == "Products" {
        return Some(Target::Collection);
    }
    let key = segment.strip_prefix("Products(")?.strip_suffix(')')?;
    key.parse().ok().map(Target::Entity)
}

fn odata_error(status: StatusCode, message: &str) -> Response {
    let body = json!({ "error": { "code": status.as_u16().to_string(), "message": message } });
    (status, Json(body)).into_response()
}

fn not_found(segment: &str) -> Response {
    odata_error(StatusCode::NOT_FOUND, &format!("resource {segment} not found"))
}

async fn read(State(db): State<Db>, Path(segment): Path<String>) -> Response {
    let store = db.read().await;
    match parse_segment(&segment) {
        Some(Target::Collection) => {
            let products: Vec<&Product> = store.products.values().collect();
            Json(json!({ "value": products })).into_response()
        }
        Some(Target::Entity(id)) => match store.products.get(&id) {
            Some(product) => Json(product).into_response(),
            None => not_found(&segment),
        },
        None => not_found(&segment),
    }
}

async fn create(State(db): State<Db>, Path(segment): Path<String>, Json(input): Json<NewProduct>) -> Response {
    if parse_segment(&segment) != Some(Target::Collection) {
        return odata_error(StatusCode::METHOD_NOT_ALLOWED, "POST is only allowed on Products");
    }
    if input.name.trim().is_empty() {
        return odata_error(StatusCode::BAD_REQUEST, "Name must not be empty");
    }

    let mut store = db.write().await;
    store.next_id += 1;
    let product = Product {
        id: store.next_id,
        name: input.name,
        price: input.price,
    };
    store.products.insert(product.id, product.clone());
    let location = format!("Products({})", product.id);
    (StatusCode::CREATED, [(header::LOCATION, location)], Json(product)).into_response()
}

async fn update(State(db): State<Db>, Path(segment): Path<String>, Json(input): Json<ProductPatch>) -> Response {
    let Some(Target::Entity(id)) = parse_segment(&segment) else {
        return odata_error(StatusCode::METHOD_NOT_ALLOWED, "PATCH requires an entity key");
    };
    let mut store = db.write().await;
    let Some(product) = store.products.get_mut(&id) else {
        return not_found(&segment);
    };
    if let Some(name) = input.name {
        product.name = name;
    }
    if let Some(price) = input.price {
        product.price = price;
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn remove(State(db): State<Db>, Path(segment): Path<String>) -> Response {
    let Some(Target::Entity(id)) = parse_segment(&segment) else {
        return odata_error(StatusCode::METHOD_NOT_ALLOWED, "DELETE requires an entity key");
    };
    match db.write().await.products.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(&segment),
    }
}

// ---------------------------------------------------------------------------
// $batch
// ---------------------------------------------------------------------------

/// One MIME part of a request envelope.
#[derive(Debug)]
struct MimePart<'a> {
    content_type: &'a str,
    content: &'a str,
}

/// One HTTP request carried inside an `application/http` part.
#[derive(Debug)]
struct SubRequest<'a> {
    method: &'a str,
    uri: &'a str,
    headers: Vec<(&'a str, &'a str)>,
    body: &'a str,
}

#[derive(Debug)]
struct SubResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: String,
}

fn boundary_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

fn split_multipart<'a>(body: &'a str, boundary: &str) -> Vec<MimePart<'a>> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    for chunk in body.split(delimiter.as_str()).skip(1) {
        if chunk.starts_with("--") {
            break;
        }
        let chunk = chunk.strip_prefix("\r\n").unwrap_or(chunk);
        let chunk = chunk.strip_suffix("\r\n").unwrap_or(chunk);
        let (head, content) = chunk.split_once("\r\n\r\n").unwrap_or((chunk, ""));
        let content_type = head
            .split("\r\n")
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.trim())
            .unwrap_or_default();
        parts.push(MimePart { content_type, content });
    }
    parts
}

fn parse_http_request(text: &str) -> Option<SubRequest<'_>> {
    let (head, body) = text.split_once("\r\n\r\n").unwrap_or((text, ""));
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?;
    let uri = request_line.next()?;
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim(), value.trim()))
        .collect();
    Some(SubRequest {
        method,
        uri,
        headers,
        body,
    })
}

/// Path of a sub-request URI relative to this service.
fn local_path(uri: &str) -> String {
    match uri.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| rest[i..].to_string()).unwrap_or_else(|| "/".to_string()),
        None if uri.starts_with('/') => uri.to_string(),
        None => format!("/{uri}"),
    }
}

fn bad_part(message: &str) -> SubResponse {
    SubResponse {
        status: StatusCode::BAD_REQUEST,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: json!({ "error": { "code": "400", "message": message } }).to_string(),
    }
}

async fn dispatch(db: &Db, request: &SubRequest<'_>) -> SubResponse {
    let mut builder = Request::builder().method(request.method).uri(local_path(request.uri));
    for (name, value) in &request.headers {
        builder = builder.header(*name, *value);
    }
    let Ok(http_request) = builder.body(Body::from(request.body.to_string())) else {
        return bad_part("malformed request");
    };

    let response = router(db.clone())
        .oneshot(http_request)
        .await
        .unwrap_or_else(|never| match never {});
    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect();
    let body = match response.into_body().collect().await {
        Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
        Err(_) => String::new(),
    };
    debug!(method = request.method, uri = request.uri, %status, "executed batch part");
    SubResponse { status, headers, body }
}

async fn execute(db: &Db, part: &MimePart<'_>) -> SubResponse {
    match parse_http_request(part.content) {
        Some(request) => dispatch(db, &request).await,
        None => bad_part("malformed request line"),
    }
}

/// Run every member of a change set, or none of them.
///
/// Members run against a private copy of the store while the live store
/// stays write-locked, so no other request interleaves with the change set.
/// The copy replaces the live store only when every member succeeded; on the
/// first failure it is dropped and the failing response stands for the
/// whole change set.
async fn execute_change_set(db: &Db, members: &[MimePart<'_>]) -> Result<Vec<SubResponse>, SubResponse> {
    let mut live = db.write().await;
    let scratch: Db = Arc::new(RwLock::new(live.clone()));

    let mut responses = Vec::with_capacity(members.len());
    for member in members {
        if !member.content_type.eq_ignore_ascii_case("application/http") {
            return Err(bad_part("change set members must be application/http"));
        }
        let response = execute(&scratch, member).await;
        if !response.status.is_success() {
            debug!(status = %response.status, "change set rolled back");
            return Err(response);
        }
        responses.push(response);
    }

    *live = scratch.read().await.clone();
    Ok(responses)
}

fn write_http_part(out: &mut String, response: &SubResponse) {
    out.push_str("Content-Type: application/http\r\nContent-Transfer-Encoding: binary\r\n\r\n");
    out.push_str(&format!(
        "HTTP/1.1 {} {}\r\n",
        response.status.as_u16(),
        response.status.canonical_reason().unwrap_or_default()
    ));
    for (name, value) in &response.headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    out.push_str(&response.body);
}

fn write_change_set_part(out: &mut String, responses: &[SubResponse]) {
    let boundary = format!("changesetresponse_{}", Uuid::new_v4());
    out.push_str(&format!("Content-Type: multipart/mixed; boundary={boundary}\r\n\r\n"));
    for response in responses {
        out.push_str(&format!("--{boundary}\r\n"));
        write_http_part(out, response);
        out.push_str("\r\n");
    }
    out.push_str(&format!("--{boundary}--"));
}

async fn batch(State(db): State<Db>, headers: HeaderMap, body: String) -> Response {
    let Some(boundary) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(boundary_of)
    else {
        return odata_error(StatusCode::BAD_REQUEST, "missing multipart boundary");
    };

    let parts = split_multipart(&body, &boundary);
    info!(parts = parts.len(), "processing batch");

    let response_boundary = format!("batchresponse_{}", Uuid::new_v4());
    let mut out = String::new();
    for part in &parts {
        out.push_str(&format!("--{response_boundary}\r\n"));
        match boundary_of(part.content_type) {
            Some(change_set_boundary) => {
                let members = split_multipart(part.content, &change_set_boundary);
                match execute_change_set(&db, &members).await {
                    Ok(responses) => write_change_set_part(&mut out, &responses),
                    Err(failure) => write_http_part(&mut out, &failure),
                }
            }
            None if part.content_type.eq_ignore_ascii_case("application/http") => {
                let response = execute(&db, part).await;
                write_http_part(&mut out, &response);
            }
            None => write_http_part(&mut out, &bad_part("unsupported MIME part type")),
        }
        out.push_str("\r\n");
    }
    out.push_str(&format!("--{response_boundary}--\r\n"));

    let content_type = format!("multipart/mixed; boundary={response_boundary}");
    ([(header::CONTENT_TYPE, content_type)], out).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_serializes_with_odata_names() {
        let product = Product {
            id: 1,
            name: "Bread".to_string(),
            price: 2.5,
        };
        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["ID"], 1);
        assert_eq!(json["Name"], "Bread");
        assert_eq!(json["Price"], 2.5);
    }

    #[test]
    fn new_product_defaults_price_to_zero() {
        let input: NewProduct = serde_json::from_str(r#"{"Name":"Milk"}"#).unwrap();
        assert_eq!(input.name, "Milk");
        assert_eq!(input.price, 0.0);
    }

    #[test]
    fn product_patch_all_fields_optional() {
        let input: ProductPatch = serde_json::from_str(r#"{}"#).unwrap();
        assert!(input.name.is_none());
        assert!(input.price.is_none());
    }

    #[test]
    fn parses_path_segments() {
        assert_eq!(parse_segment("Products"), Some(Target::Collection));
        assert_eq!(parse_segment("Products(12)"), Some(Target::Entity(12)));
        assert_eq!(parse_segment("Products(x)"), None);
        assert_eq!(parse_segment("Orders"), None);
    }

    #[test]
    fn extracts_boundary_parameter() {
        assert_eq!(boundary_of("multipart/mixed; boundary=batch_1"), Some("batch_1".to_string()));
        assert_eq!(boundary_of(r#"multipart/mixed;Boundary="b 2""#), Some("b 2".to_string()));
        assert_eq!(boundary_of("application/http"), None);
    }

    #[test]
    fn splits_envelope_into_parts() {
        let body = "\r\n--b\r\nContent-Type: application/http\r\n\r\nGET Products HTTP/1.1\r\n\r\n\
                    \r\n--b\r\nContent-Type: multipart/mixed; boundary=c\r\n\r\n--c\r\nContent-Type: application/http\r\n\r\n\
                    DELETE Products(1) HTTP/1.1\r\n\r\n\r\n--c--\r\n\
                    \r\n--b--\r\n";
        let parts = split_multipart(body, "b");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].content_type, "application/http");
        assert_eq!(parts[0].content, "GET Products HTTP/1.1\r\n\r\n");

        let members = split_multipart(parts[1].content, "c");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].content, "DELETE Products(1) HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn parses_request_text() {
        let request = parse_http_request("POST Products HTTP/1.1\r\nContent-Type: application/json\r\n\r\n{\"Name\":\"x\"}")
            .unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.uri, "Products");
        assert_eq!(request.headers, vec![("Content-Type", "application/json")]);
        assert_eq!(request.body, "{\"Name\":\"x\"}");
    }

    #[test]
    fn local_path_strips_service_host() {
        assert_eq!(local_path("http://127.0.0.1:3000/Products(1)"), "/Products(1)");
        assert_eq!(local_path("Products"), "/Products");
        assert_eq!(local_path("/Products"), "/Products");
        assert_eq!(local_path("http://host"), "/");
    }
}
