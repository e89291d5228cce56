use lazy_static::lazy_static;
use regex::Regex;
use std::str;

lazy_static! {
    /// An entity that is already escaped and must not be escaped again.
    static ref ENTITY: Regex =
        Regex::new(r"^&(?:[A-Za-z][A-Za-z0-9]{0,31}|#[0-9]{1,7}|#[xX][0-9A-Fa-f]{1,6});")
            .expect("core regex failure");
}

/// Drop every invalid byte sequence, keeping the valid text around it.
pub fn repair_utf8(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;

    loop {
        match str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                break;
            },
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                if let Ok(valid) = str::from_utf8(valid) {
                    out.push_str(valid);
                }
                // error_len is None when the input ends mid-sequence
                let skip = err.error_len().unwrap_or(after.len());
                rest = &after[skip..];
            },
        }
    }

    out
}

/// Escape `&`, `<`, `>` and `"` for a post body. Ampersands that already
/// begin an entity are kept as they are.
pub fn escape_comment(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);

    for (i, c) in text.char_indices() {
        match c {
            '&' => {
                if ENTITY.is_match(&text[i..]) {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
            },
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }

    out
}

/// Sanitize a raw comment: repair the encoding, then escape it.
pub fn sanitize_comment(raw: &[u8]) -> String {
    escape_comment(&repair_utf8(raw))
}

/// Escape a short display field (name, trip, title, ...) for use anywhere
/// in a page, attributes included.
pub fn process_field(raw: &str) -> String {
    let repaired = repair_utf8(raw.as_bytes());
    html_escape::encode_quoted_attribute(&repaired).into_owned()
}
