//! Provisional identifiers returned by dry-run creates.
//!
//! Stable across repeated previews of the same inputs, and shaped so they
//! can never collide with an identifier the server assigns.

use sha2::{Digest, Sha256};

const MAX_BASE_LEN: usize = 40;

/// Strip quotes, replace spaces and cap the length.
pub fn sanitize(base: &str) -> String {
    base.replace('"', "")
        .replace(' ', "-")
        .chars()
        .take(MAX_BASE_LEN)
        .collect()
}

/// `preview-<sanitized base>-<first 8 hex digits of sha256(sql)>`
pub fn provisional_id(base: &str, sql: &str) -> String {
    let digest = Sha256::digest(sql.as_bytes());
    let hash = hex::encode(digest);
    format!("preview-{}-{}", sanitize(base), &hash[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("\"db\".\"public\".\"sink\""), "db.public.sink");
        assert_eq!(sanitize("my sink"), "my-sink");
        assert_eq!(sanitize(&"x".repeat(100)).len(), 40);
    }

    #[test]
    fn test_provisional_id_is_stable() {
        let sql = "INSERT INTO sink SELECT * FROM src;";
        let a = provisional_id("\"db\".\"public\".\"sink\"", sql);
        let b = provisional_id("\"db\".\"public\".\"sink\"", sql);
        assert_eq!(a, b);
        assert!(a.starts_with("preview-db.public.sink-"));
        assert_eq!(a.len(), "preview-db.public.sink-".len() + 8);
    }

    #[test]
    fn test_provisional_id_tracks_sql() {
        let a = provisional_id("sink", "INSERT INTO sink SELECT a FROM src;");
        let b = provisional_id("sink", "INSERT INTO sink SELECT b FROM src;");
        assert_ne!(a, b);
    }
}
