//! Random delimiter strings for multipart envelopes.
//!
//! Boundaries are drawn from `rand::thread_rng` and are not checked against
//! the content they wrap; a collision with body text would corrupt the
//! envelope. Three random 16-bit groups make that unlikely for the payload
//! sizes a batch carries.

use rand::Rng;

/// Prefix of an outer batch envelope boundary.
pub const BATCH_PREFIX: &str = "batch_";

/// Prefix of a change-set envelope boundary.
pub const CHANGESET_PREFIX: &str = "changeset_";

/// Create a boundary of the form `<prefix>xxxx-xxxx-xxxx`.
pub fn create_boundary(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{prefix}{}-{}-{}",
        random_hex4(&mut rng),
        random_hex4(&mut rng),
        random_hex4(&mut rng)
    )
}

/// Four lowercase hex digits. Drawing from `[0x10000, 0x20000)` and dropping
/// the leading `1` keeps the zero padding.
fn random_hex4(rng: &mut impl Rng) -> String {
    hex4(rng.gen_range(0x10000..0x20000))
}

/// `value` in `[0x10000, 0x20000)` as hex without its leading digit.
fn hex4(value: u32) -> String {
    format!("{value:x}")[1..].to_string()
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::*;

    #[test]
    fn boundary_has_prefix_and_three_hex_groups() {
        let pattern = Regex::new(r"^batch_[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}$").unwrap();
        for _ in 0..64 {
            let boundary = create_boundary(BATCH_PREFIX);
            assert!(pattern.is_match(&boundary), "{boundary}");
        }
    }

    #[test]
    fn changeset_prefix_is_kept() {
        assert!(create_boundary(CHANGESET_PREFIX).starts_with("changeset_"));
    }

    #[test]
    fn low_values_are_zero_padded() {
        assert_eq!(hex4(0x10000), "0000");
        assert_eq!(hex4(0x100a0), "00a0");
        assert_eq!(hex4(0x1ffff), "ffff");
    }

    #[test]
    fn consecutive_boundaries_differ() {
        assert_ne!(create_boundary(BATCH_PREFIX), create_boundary(BATCH_PREFIX));
    }
}
