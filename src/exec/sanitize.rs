//! Allow-list input filters.
//!
//! Untrusted request parameters must pass one of these filters (or travel
//! over the runner's stdin channel) before they may be stored or appear in
//! any string a shell will see. Filtering strips disallowed characters
//! rather than rejecting, matching the provisioned clients' behavior; an
//! input that is empty after filtering is invalid.

/// Filter a saved-signal name down to `[A-Za-z0-9_-]`.
pub fn signal_name(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Filter a raw IR code down to digits and whitespace, trimmed.
pub fn signal_code(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_digit() || c.is_ascii_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}

/// True when `name` is usable as a URL path segment: non-empty, ASCII
/// lowercase alphanumerics plus `_` and `-`. Module names must satisfy this
/// before they are mounted.
pub fn is_path_safe(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}
