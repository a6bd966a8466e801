//! Credential redaction for device errors and logs.
//!
//! SSH library errors can echo whatever was sent on the wire, so every error
//! string that might reach a caller passes through [`sanitize_error`] first.

/// Replace any occurrence of the device password in `message`.
pub fn sanitize_error(message: &str, password: &str) -> String {
    if password.is_empty() {
        return message.to_string();
    }
    message.replace(password, "***REDACTED***")
}

/// Mask a password for debug logs: first character plus stars.
pub fn mask_password(password: &str) -> String {
    let mut chars = password.chars();
    match chars.next() {
        Some(first) => format!("{first}{}", "*".repeat(chars.count())),
        None => String::new(),
    }
}
