use std::sync::LazyLock;

use regex::Regex;

use crate::structured::{Flag, StructuredRecord};

static FLAG_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[\s*flag\s*:\s*([^\]]+?)\s*\]").expect("valid flag marker regex")
});

/// Arbitration rule over panel flags: any critical wins, then a strict
/// majority of warnings, otherwise ok.
pub fn aggregate<I: IntoIterator<Item = Flag>>(flags: I) -> Flag {
    let mut total = 0usize;
    let mut warnings = 0usize;
    for flag in flags {
        total += 1;
        match flag {
            Flag::Critical => return Flag::Critical,
            Flag::Warning => warnings += 1,
            Flag::Ok => {}
        }
    }
    if warnings * 2 > total {
        Flag::Warning
    } else {
        Flag::Ok
    }
}

/// Read the flag the arbiter put in its text.
///
/// An explicit `[FLAG : X]` marker wins; otherwise the most severe flag emoji
/// present anywhere in the text.
pub fn flag_in_text(text: &str) -> Option<Flag> {
    if let Some(flag) = FLAG_MARKER
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| Flag::parse(m.as_str()))
    {
        return Some(flag);
    }
    [Flag::Critical, Flag::Warning, Flag::Ok]
        .into_iter()
        .find(|f| text.contains(f.emoji()))
}

/// Verdict flag for a run: what the arbiter said, or the panel aggregate if
/// the arbiter text carries no flag.
pub fn resolve(arbiter_text: &str, panel: &StructuredRecord) -> Flag {
    flag_in_text(arbiter_text).unwrap_or_else(|| aggregate(panel.flags()))
}
