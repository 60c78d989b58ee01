//! Free-text sanitising for user-editable fields

use regex::Regex;
use std::sync::LazyLock;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));

static SCRIPT_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)javascript\s*:").expect("script uri pattern"));

// Control characters other than tab and newline
static CONTROL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B-\x1F\x7F]").expect("control pattern"));

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{3,32}$").expect("username pattern"));

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));

/// Strip markup tags, `javascript:` URIs and control characters, then trim.
///
/// Removing one pattern can splice together another (`jajavascript:vascript:`),
/// so the passes repeat until the text stops changing. Every pass that
/// changes anything makes the text shorter, so this terminates.
pub fn sanitize_text(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = strip_once(&current);
        if next == current {
            return next.trim().to_string();
        }
        current = next;
    }
}

fn strip_once(input: &str) -> String {
    let s = TAG.replace_all(input, "");
    let s = SCRIPT_URI.replace_all(&s, "");
    CONTROL.replace_all(&s, "").into_owned()
}

/// Usernames are stored lowercased, so `Alice` and `alice` are one account
pub fn normalize_username(username: &str) -> String {
    username.trim().to_ascii_lowercase()
}

/// 3-32 characters of letters, digits, `_` and `-`
pub fn is_valid_username(username: &str) -> bool {
    USERNAME.is_match(username)
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL.is_match(email)
}
