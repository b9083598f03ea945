//! Redaction of contact details before document text leaves the machine.

use std::sync::LazyLock;

use regex::Regex;

pub const EMAIL_PLACEHOLDER: &str = "[EMAIL_HIDDEN]";
pub const PHONE_PLACEHOLDER: &str = "[PHONE_HIDDEN]";

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.+-]+@[\w-]+(?:\.[\w-]+)+").expect("valid email regex"));

// French numbers: 0X XX XX XX XX or +33 X XX XX XX XX, separators `-`, `.` or space.
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+33[-. ]?|\b0)[1-9](?:[-. ]?[0-9]{2}){4}\b").expect("valid phone regex")
});

/// Replace e-mail addresses and phone numbers with placeholders.
pub fn anonymize(text: &str) -> String {
    let without_email = EMAIL.replace_all(text, EMAIL_PLACEHOLDER);
    PHONE
        .replace_all(&without_email, PHONE_PLACEHOLDER)
        .into_owned()
}

/// Truncate to at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("été", 2), "ét");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
