//! Credential scrubbing for log output.
//!
//! Endpoint strings may embed `user:password@host` credentials. Anything that
//! might carry such a string (host lists, transport errors, response bodies)
//! is passed through [`scrub`] before it reaches a log line or an error message.

use regex::Regex;
use std::sync::OnceLock;

/// Replacement written in place of every secret.
pub const REDACTED: &str = "XXXXXX";

/// Characters allowed in the userinfo component of a URL (RFC 3986 unreserved,
/// sub-delims and percent-encoding).
const USER_INFO_CHARS: &str = r"\w\-\._~!$&'()*+,;=%";

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let expr = format!("([{chars}]*?):[{chars}]+?@", chars = USER_INFO_CHARS);
        Regex::new(&expr).expect("userinfo pattern is a valid regex")
    })
}

/// Redact the password of every `user:password@host` occurrence in `text`.
///
/// The username, the `@` and the host are left intact. Matching is purely
/// pattern based and works on arbitrary multi-line text.
pub fn scrub(text: &str) -> String {
    let replacement = format!("${{1}}:{}@", REDACTED);
    pattern().replace_all(text, replacement.as_str()).into_owned()
}

/// Convenience for scrubbing anything with a `Display` impl (errors, urls).
pub fn scrub_display(value: &impl std::fmt::Display) -> String {
    scrub(&value.to_string())
}
