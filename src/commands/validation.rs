//! Token rules for keys, values and members.

/// A valid token is non-empty and made of letters, digits, `-` or `_`.
pub fn is_valid_token(input: &str) -> bool {
    !input.is_empty()
        && input
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}
