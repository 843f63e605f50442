//! Batch lifecycle test against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then sends single requests and
//! `$batch` envelopes built by the core over real HTTP using ureq. Validates
//! that the batch writer, the server's multipart handling and the batch
//! reader agree on the wire format end-to-end.

use odata_core::{
    ApiError, BatchRequest, BatchResponsePart, ChangeSet, Headers, HttpMethod, HttpRequest, HttpResponse,
    ODataClient, Request,
};
use serde_json::json;

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &Headers) -> ureq::RequestBuilder<B> {
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }
    builder
}

/// Execute an `HttpRequest` using ureq and return an `HttpResponse`.
///
/// Disables ureq's automatic status-code-as-error behavior so 4xx/5xx
/// responses are returned as data rather than `Err`, letting the core
/// client handle status interpretation.
fn execute(req: HttpRequest) -> HttpResponse {
    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .new_agent();

    let url = req.url.as_str();
    let body = req.body.unwrap_or_default();
    let mut response = match req.method {
        HttpMethod::Get => with_headers(agent.get(url), &req.headers).call(),
        HttpMethod::Delete => with_headers(agent.delete(url), &req.headers).call(),
        HttpMethod::Post => with_headers(agent.post(url), &req.headers).send(body.as_bytes()),
        HttpMethod::Put => with_headers(agent.put(url), &req.headers).send(body.as_bytes()),
        HttpMethod::Patch => with_headers(agent.patch(url), &req.headers).send(body.as_bytes()),
    }
    .expect("HTTP transport error");

    let status = response.status().as_u16();
    let headers: Headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect();
    let body = response.body_mut().read_to_string().unwrap_or_default();

    HttpResponse { status, headers, body }
}

fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

#[test]
fn batch_lifecycle() {
    // Step 1: start mock server on a random port.
    let client = ODataClient::new(&start_server());

    // Step 2: the entity set starts empty.
    let req = client.build_request(&Request::get("Products")).unwrap();
    let listed = client.parse_response(execute(req)).unwrap();
    assert_eq!(listed.data, Some(json!({ "value": [] })));

    // Step 3: one batch with a change set, a read, and a read that fails.
    let batch = BatchRequest::new()
        .with_change_set(ChangeSet::new([
            Request::post("Products", json!({ "Name": "Bread", "Price": 2.5 })),
            Request::post("Products", json!({ "Name": "Milk", "Price": 1.25 })),
        ]))
        .with_request(Request::get("Products"))
        .with_request(Request::get("Products(42)"));
    let req = client.build_batch(&batch).unwrap();
    let result = client.parse_batch(execute(req)).unwrap();
    assert_eq!(result.len(), 3);

    let change_set = result.responses[0].as_change_set().expect("change set response");
    assert_eq!(change_set.responses.len(), 2);
    let created: Vec<_> = change_set
        .responses
        .iter()
        .map(|part| part.as_response().expect("created response"))
        .collect();
    assert_eq!(created[0].status_code, Some(201));
    assert_eq!(created[0].status_text.as_deref(), Some("Created"));
    assert_eq!(created[0].headers.get("Location"), Some("Products(1)"));
    assert_eq!(created[0].data.as_ref().unwrap()["Name"], "Bread");
    assert_eq!(created[1].data.as_ref().unwrap()["ID"], 2);

    let listed = result.responses[1].as_response().expect("list response");
    assert_eq!(listed.data.as_ref().unwrap()["value"].as_array().unwrap().len(), 2);

    let missing = result.responses[2].as_error().expect("failed part");
    assert_eq!(missing.response.status_code, Some(404));

    // Step 4: a failing change set is rolled back and reported in place.
    let batch = BatchRequest::new()
        .with_change_set(ChangeSet::new([
            Request::patch("Products(1)", json!({ "Price": 3.0 })),
            Request::delete("Products(99)"),
        ]))
        .with_request(Request::get("Products(1)"));
    let req = client.build_batch(&batch).unwrap();
    let result = client.parse_batch(execute(req)).unwrap();
    assert_eq!(result.len(), 2);

    let failed = result.responses[0].as_error().expect("change set failure");
    assert_eq!(failed.response.status_code, Some(404));
    let bread = result.responses[1].as_response().expect("read after rollback");
    assert_eq!(bread.data.as_ref().unwrap()["Price"], 2.5);

    // Step 5: a delete answers with an empty 204 part.
    let batch = BatchRequest::new().with_request(Request::delete("Products(2)"));
    let req = client.build_batch(&batch).unwrap();
    let result = client.parse_batch(execute(req)).unwrap();
    let deleted = result.responses[0].as_response().expect("delete response");
    assert_eq!(deleted.status_code, Some(204));
    assert!(deleted.body.is_empty());
    assert!(deleted.data.is_none());

    // Step 6: the deleted entity is gone.
    let req = client.build_request(&Request::get("Products(2)")).unwrap();
    let err = client.parse_response(execute(req)).unwrap_err();
    assert!(matches!(err, ApiError::NotFound));
}

#[test]
fn malformed_batch_is_rejected_by_status() {
    let client = ODataClient::new(&start_server());
    let mut req = client
        .build_batch(&BatchRequest::new().with_request(Request::get("Products")))
        .unwrap();
    req.headers.set("Content-Type", "multipart/mixed");

    let err = client.parse_batch(execute(req)).unwrap_err();
    assert!(matches!(err, ApiError::HttpError { status: 400, .. }));
}
