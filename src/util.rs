use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrOrigin {
    Config,
    Database,
    Template,
    /// The caller broke an API contract, e.g. rendered a post against an
    /// index it was never registered in. Never retried.
    Contract,
}

impl fmt::Display for ErrOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrOrigin::Config => "config",
            ErrOrigin::Database => "database",
            ErrOrigin::Template => "template",
            ErrOrigin::Contract => "contract",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{origin} error: {msg}")]
pub struct ArchiveErr {
    pub origin: ErrOrigin,
    pub msg: String,
}

impl ArchiveErr {
    pub fn new(origin: ErrOrigin, msg: impl Into<String>) -> ArchiveErr {
        ArchiveErr {
            origin,
            msg: msg.into(),
        }
    }
}

impl From<toml::de::Error> for ArchiveErr {
    fn from(err: toml::de::Error) -> Self {
        ArchiveErr {
            origin: ErrOrigin::Config,
            msg: format!("{}", err),
        }
    }
}

impl From<std::io::Error> for ArchiveErr {
    fn from(err: std::io::Error) -> Self {
        ArchiveErr {
            origin: ErrOrigin::Database,
            msg: format!("{}", err),
        }
    }
}

/// True for a non-empty run of ASCII digits.
pub fn is_natural(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Accepts `123`, `123,4` and `123_4`.
pub fn is_valid_post_number(s: &str) -> bool {
    if is_natural(s) {
        return true;
    }

    match s.find(|c: char| c == ',' || c == '_') {
        Some(i) => is_natural(&s[..i]) && is_natural(&s[i + 1..]),
        None => false,
    }
}

/// Split a post number into `(num, subnum)`. Either `,` or `_` may separate
/// the two halves; a bare number has subnum 0.
pub fn split_post_number(s: &str) -> Option<(u64, u64)> {
    if !is_valid_post_number(s) {
        return None;
    }

    match s.find(|c: char| c == ',' || c == '_') {
        Some(i) => {
            let num = s[..i].parse().ok()?;
            let subnum = s[i + 1..].parse().ok()?;
            Some((num, subnum))
        },
        None => Some((s.parse().ok()?, 0)),
    }
}
