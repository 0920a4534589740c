//! Input normalisation for account and passenger fields.

use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid email regex")
});

#[allow(clippy::expect_used)]
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// Canonical form used for every email lookup and insert.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Trim, drop markup tags, drop ASCII control characters.
pub fn sanitize_input(input: &str) -> String {
    TAG_RE
        .replace_all(input.trim(), "")
        .chars()
        .filter(|c| !c.is_ascii_control())
        .collect()
}
