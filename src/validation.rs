// Validation utilities module
// Custom validation functions for account fields and error formatting

use regex::Regex;
use std::sync::OnceLock;
use validator::{ValidationError, ValidationErrors};

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.]{3,30}$").expect("username pattern is valid"))
}

/// Validates that a username is 3-30 characters of letters, digits, `_` or `.`
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username_pattern().is_match(username.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_username"))
    }
}

/// Validates that a value is not empty once surrounding whitespace is removed
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank"))
    } else {
        Ok(())
    }
}

/// Flatten validator errors into a single client-facing message
/// e.g. "email: email; username: invalid_username"
pub fn describe(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let codes: Vec<String> = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            format!("{}: {}", field, codes.join(", "))
        })
        .collect();
    fields.sort();
    fields.join("; ")
}
