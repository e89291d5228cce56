use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref BARE_URL: Regex =
        Regex::new(r"(?i)(^|\s|\(|\])((http(s?)://)|(www\.))(\w+[^\s\)<]+)").expect("core regex failure");
    static ref BRACKETED: Regex = Regex::new(r"\[[^\[\]]*\]").expect("core regex failure");
    static ref ANCHOR: Regex = Regex::new(r"(?is)<a\s[^>]*>.*?</a>").expect("core regex failure");
}

fn link_url(caps: &Captures<'_>, popup: bool) -> String {
    let lead = caps.get(1).map_or("", |m| m.as_str());
    let secure = caps.get(4).map_or("", |m| m.as_str());
    let www = caps.get(5).map_or("", |m| m.as_str());
    let mut rest = caps.get(6).map_or("", |m| m.as_str());

    let mut period = "";
    if let Some(stripped) = rest.strip_suffix('.') {
        rest = stripped;
        period = ".";
    }

    let href_rest = BRACKETED.replace_all(rest, "");
    let target = if popup { " target=\"_blank\"" } else { "" };

    format!(
        "{}<a href=\"http{}://{}{}\"{}>http{}://{}{}</a>{}",
        lead, secure, www, href_rest, target, secure, www, rest, period,
    )
}

/// Wrap bare `http://`, `https://` and `www.` URLs in anchors. Text inside
/// existing anchors is left alone so links never nest, and a URL only counts
/// as bare at the very start of the text or after whitespace, `(` or `]`.
pub fn autolink(html: &str, popup: bool) -> String {
    let anchors = ANCHOR.find_iter(html).map(|m| m.range()).collect::<Vec<_>>();
    let mut out = String::with_capacity(html.len());
    let mut copied = 0;
    let mut pos = 0;

    while let Some(caps) = BARE_URL.captures_at(html, pos) {
        let whole = match caps.get(0) {
            Some(whole) => whole,
            None => break,
        };

        if let Some(anchor) = anchors.iter().find(|a| a.contains(&whole.start())) {
            pos = anchor.end;
            continue;
        }

        out.push_str(&html[copied..whole.start()]);
        out.push_str(&link_url(&caps, popup));
        copied = whole.end();
        pos = whole.end();
    }
    out.push_str(&html[copied..]);

    out
}
