//! Id validation and generation.

use crate::error::{Error, Result};
use rustc_hash::FxHashSet;

/// Generates an opaque unique id: 128 random bits rendered as hex.
pub(super) fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Validates a caller-supplied id: non-empty, no surrounding whitespace,
/// printable characters only.
pub(super) fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidInput("id must not be empty".to_string()));
    }
    if id.trim() != id {
        return Err(Error::InvalidInput(format!(
            "id '{id}' has surrounding whitespace"
        )));
    }
    if id.chars().any(char::is_control) {
        return Err(Error::InvalidInput(
            "id contains non-printable characters".to_string(),
        ));
    }
    Ok(())
}

/// Rejects duplicate ids within one batch.
pub(super) fn check_batch_unique(ids: &[String]) -> Result<()> {
    let mut seen = FxHashSet::default();
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(Error::Conflict(format!("duplicate id '{id}' in batch")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_hex_and_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("doc-1").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id(" padded").is_err());
        assert!(validate_id("padded ").is_err());
        assert!(validate_id("tab\there").is_err());
    }

    #[test]
    fn test_duplicate_in_batch_conflicts() {
        let ids = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert!(matches!(
            check_batch_unique(&ids),
            Err(Error::Conflict(_))
        ));
        assert!(check_batch_unique(&ids[..2].to_vec()).is_ok());
    }
}
