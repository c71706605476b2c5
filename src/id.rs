use uuid::Uuid;

/// Generate an opaque 32-character hex identifier.
///
/// Identifiers double as database keys and filesystem path segments, so they
/// must never contain separators or characters needing escaping.
pub fn generate() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_32_hex_chars() {
        let id = generate();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn identifiers_are_unique() {
        assert_ne!(generate(), generate());
    }

    #[test]
    fn identifiers_are_filesystem_safe() {
        let id = generate();
        assert!(!id.contains('/'));
        assert!(!id.contains('\\'));
        assert!(!id.contains('.'));
    }
}
