use sha1::{Digest, Sha1};

const DIGEST_PREFIX_LEN: usize = 10;
const INVOCATION_PREFIX_LEN: usize = 8;

/// First ten hex characters of the SHA-1 hash of the uncompressed batch
/// content. Used for key uniqueness across concurrent invocations, not
/// for integrity verification.
pub fn content_digest(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(content);
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(DIGEST_PREFIX_LEN);
    hex
}

/// Object key for one compressed event batch:
/// `{prefix}/ingest_dt={date}/{time}-{invocation prefix}-{digest}.json.gz`.
///
/// Deterministic for identical content and invocation id, so re-writing
/// the same batch lands on the same key.
pub fn events_object_key(
    base_prefix: &str,
    ingest_date: &str,
    ingest_time: &str,
    invocation_id: &str,
    digest: &str,
) -> String {
    let trimmed = base_prefix.trim_matches('/');
    let invocation = invocation_id
        .get(..INVOCATION_PREFIX_LEN)
        .unwrap_or(invocation_id);
    format!("{trimmed}/ingest_dt={ingest_date}/{ingest_time}-{invocation}-{digest}.json.gz")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_events_key_with_expected_partitions() {
        let key = events_object_key(
            "github/events/",
            "2024-01-01",
            "20240101-000005",
            "3f8c2d1a-aaaa-bbbb-cccc-0123456789ab",
            "aaf4c61ddc",
        );

        assert_eq!(
            key,
            "github/events/ingest_dt=2024-01-01/20240101-000005-3f8c2d1a-aaf4c61ddc.json.gz"
        );
    }

    #[test]
    fn short_invocation_ids_pass_through_untruncated() {
        let key = events_object_key("prefix", "2024-01-01", "20240101-000005", "abc", "0123456789");
        assert_eq!(
            key,
            "prefix/ingest_dt=2024-01-01/20240101-000005-abc-0123456789.json.gz"
        );
    }

    #[test]
    fn digest_is_ten_hex_characters() {
        let digest = content_digest(b"hello");
        assert_eq!(digest, "aaf4c61ddc");
    }

    #[test]
    fn digest_is_deterministic_for_identical_content() {
        assert_eq!(content_digest(b"same bytes"), content_digest(b"same bytes"));
    }

    #[test]
    fn digest_differs_for_different_content() {
        assert_ne!(content_digest(b"batch one"), content_digest(b"batch two"));
    }
}
