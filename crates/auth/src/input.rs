//! Normalization of free-text input fields.

use geoaccess_core::{DomainError, DomainResult};

/// Trim a required name; empty after trimming is a validation failure.
pub fn required_name(field: &str, raw: &str) -> DomainResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional description; empty after trimming is stored as absent.
pub fn optional_description(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed() {
        assert_eq!(required_name("name", "  Chile ").unwrap(), "Chile");
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = required_name("country name", " \t").unwrap_err();
        assert_eq!(err, DomainError::validation("country name is required"));
    }

    #[test]
    fn blank_description_becomes_none() {
        assert_eq!(optional_description(Some("   ")), None);
        assert_eq!(optional_description(None), None);
        assert_eq!(optional_description(Some(" ops ")).as_deref(), Some("ops"));
    }
}
