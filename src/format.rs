use crate::site::Capcode;
use chrono::DateTime;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// Formatting some admins of the archived site wrapped their posts in.
/// Each opener has a fixed closer that goes with it.
const LEGACY_WRAPPERS: [(&str, &str); 2] = [
    (
        "<div style=\"padding: 5px;margin-left: .5em;border-color: #faa;border: 2px dashed rgba(255,0,0,.1);border-radius: 2px\">",
        "</div>",
    ),
    (
        "<span style=\"padding: 5px;margin-left: .5em;border-color: #faa;border: 2px dashed rgba(255,0,0,.1);border-radius: 2px\">",
        "[/spoiler]",
    ),
];

lazy_static! {
    static ref QUOTE_LINE: Regex = Regex::new(r"(\r?\n|^)(&gt;[^\n]*)").expect("core regex failure");
    static ref BANNED: Regex = Regex::new(r"(?is)\[banned\](.*?)\[/banned\]").expect("core regex failure");
    static ref LITERAL: Regex =
        Regex::new(r"(?i)\[(/?)(banned|moot):lit\]").expect("core regex failure");
    static ref NEWLINE: Regex = Regex::new(r"\r\n|\n\r|\n|\r").expect("core regex failure");
}

pub fn utc_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .unwrap_or_default()
        .to_string()
}

/// Date as the archived site printed it, e.g. `3/7/13(Thu)9:05`.
pub fn fourchan_date(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .unwrap_or_default()
        .format("%-m/%-d/%y(%a)%-H:%M")
        .to_string()
}

/// Shift a timestamp recorded on the origin's clock to UTC.
pub fn adjust_timestamp(ts: i64, origin_utc_offset_hours: i64) -> i64 {
    ts - origin_utc_offset_hours * 60 * 60
}

/// Strip the legacy wrapper from an admin post. Works on the raw body,
/// before escaping.
pub fn strip_legacy_wrappers(body: &str, capcode: Capcode) -> String {
    if capcode != Capcode::Admin {
        return body.to_string();
    }

    for (open, close) in LEGACY_WRAPPERS.iter() {
        if let Some(inner) = body.strip_prefix(open) {
            let inner = inner.replace(open, "");
            return match inner.strip_suffix(close) {
                Some(stripped) => stripped.to_string(),
                None => inner,
            };
        }
    }

    body.to_string()
}

/// Wrap each line starting with an escaped `>` in a greentext span. Lines
/// that start with a resolved reference already begin with an anchor and
/// are left alone.
pub fn greentext(text: &str) -> String {
    QUOTE_LINE
        .replace_all(text, |caps: &Captures<'_>| {
            let lead = &caps[1];
            let line = &caps[2];
            let (line, cr) = match line.strip_suffix('\r') {
                Some(line) => (line, "\r"),
                None => (line, ""),
            };
            format!("{}<span class=\"greentext\">{}</span>{}", lead, line, cr)
        })
        .into_owned()
}

/// Archive-only markup: `[banned]` notices, and the `:lit` escapes that
/// show the tag names themselves.
pub fn admin_markup(text: &str) -> String {
    let text = BANNED.replace_all(text, "<span class=\"banned\">$1</span>");
    LITERAL
        .replace_all(&text, |caps: &Captures<'_>| {
            format!("[{}{}]", &caps[1], caps[2].to_ascii_lowercase())
        })
        .into_owned()
}

/// `<br />` before every line break, after trimming the ends.
pub fn line_breaks(text: &str) -> String {
    let trimmed = text.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r' | '\0' | '\x0B'));
    NEWLINE.replace_all(trimmed, "<br />$0").into_owned()
}
