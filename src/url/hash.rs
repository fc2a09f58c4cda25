use sha2::{Digest, Sha256};

/// Computes the fixed-width digest of a page URI
///
/// Pages are looked up and deduplicated by this value, so it must be
/// recomputed whenever a page's URI changes. The digest is the lowercase hex
/// SHA-256 of the URI bytes (64 characters).
///
/// # Examples
///
/// ```
/// use site_auditor::url::uri_hash;
///
/// assert_eq!(uri_hash("https://example.com/").len(), 64);
/// ```
pub fn uri_hash(uri: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(uri.as_bytes());
    hex::encode(hasher.finalize())
}
