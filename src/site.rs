use crate::config::{BoardConfig, Config};
use crate::format;
use crate::index::{PostIndex, PostKey};
use crate::media::{Media, MediaRow};
use crate::sanitize;
use crate::util::{ArchiveErr, ErrOrigin};
use serde::Deserialize;
use std::collections::HashSet;

/// Staff marker shown next to a poster's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capcode {
    #[default]
    None,
    Moderator,
    Admin,
    Developer,
}

impl Capcode {
    pub fn from_code(code: &str) -> Capcode {
        match code {
            "M" => Capcode::Moderator,
            "A" => Capcode::Admin,
            "D" => Capcode::Developer,
            _ => Capcode::None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Capcode::None => "N",
            Capcode::Moderator => "M",
            Capcode::Admin => "A",
            Capcode::Developer => "D",
        }
    }
}

/// Checked against the viewer's permissions. Deciding who holds which
/// permission is the caller's business.
pub trait Access {
    fn has_access(&self, permission: &str) -> bool;
}

/// A viewer with no permissions.
pub struct Anonymous;

impl Access for Anonymous {
    fn has_access(&self, _permission: &str) -> bool {
        false
    }
}

/// A fixed set of granted permissions, e.g. `comment.see_ip`.
#[derive(Debug, Clone, Default)]
pub struct Permissions {
    granted: HashSet<String>,
}

impl Permissions {
    pub fn new(granted: &[&str]) -> Permissions {
        Permissions {
            granted: granted.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Access for Permissions {
    fn has_access(&self, permission: &str) -> bool {
        self.granted.contains(permission)
    }
}

/// A value computed from a post at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derived<T>(Option<T>);

impl<T> Default for Derived<T> {
    fn default() -> Self {
        Derived(None)
    }
}

impl<T> Derived<T> {
    pub fn computed(value: T) -> Derived<T> {
        Derived(Some(value))
    }

    pub fn ready(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.0.is_some()
    }

    pub fn get_or_insert_with<F: FnOnce() -> T>(&mut self, f: F) -> &T {
        self.0.get_or_insert_with(f)
    }
}

/// A post as stored by the archive.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PostRow {
    pub doc_id        : u64,
    pub num           : u64,
    pub subnum        : u64,
    pub thread_num    : u64,
    pub op            : bool,
    pub timestamp     : i64,
    pub capcode       : String,
    pub name          : Option<String>,
    pub trip          : Option<String>,
    pub email         : Option<String>,
    pub title         : Option<String>,
    pub comment       : Option<String>,
    pub poster_ip     : Option<String>,
    pub delpass       : Option<String>,
    pub poster_hash   : Option<String>,
    pub poster_country: Option<String>,
    pub media         : Option<MediaRow>,
}

#[derive(Debug, Clone)]
pub struct Post {
    pub board         : BoardConfig,
    pub doc_id        : u64,
    pub thread_num    : u64,
    pub num           : u64,
    pub subnum        : u64,
    pub op            : bool,
    pub timestamp     : i64,
    pub capcode       : Capcode,
    pub comment       : String,
    pub name          : Option<String>,
    pub trip          : Option<String>,
    pub email         : Option<String>,
    pub title         : Option<String>,
    pub poster_hash   : Option<String>,
    pub poster_country: Option<String>,
    pub poster_ip     : Option<String>,
    pub delpass       : Option<String>,
    pub media         : Option<Media>,

    comment_sanitized     : Derived<String>,
    comment_processed     : Derived<String>,
    title_processed       : Derived<String>,
    name_processed        : Derived<String>,
    email_processed       : Derived<String>,
    trip_processed        : Derived<String>,
    poster_hash_processed : Derived<String>,
    country_name_processed: Derived<Option<String>>,
    fourchan_date         : Derived<String>,
    formatted             : Derived<String>,
}

fn processed(field: &Option<String>) -> String {
    sanitize::process_field(field.as_deref().unwrap_or(""))
}

impl Post {
    /// Build a post from its stored row. Archive boards recorded times on
    /// the origin's clock; those are shifted to UTC here.
    pub fn from_row(row: PostRow, board: &BoardConfig, config: &Config, access: &dyn Access) -> Post {
        let timestamp = if board.archive && board.adjust_timezone {
            format::adjust_timestamp(row.timestamp, config.site.archive_utc_offset_hours)
        } else {
            row.timestamp
        };

        let op = row.op;
        Post {
            board: board.clone(),
            doc_id: row.doc_id,
            thread_num: row.thread_num,
            num: row.num,
            subnum: row.subnum,
            op,
            timestamp,
            capcode: Capcode::from_code(&row.capcode),
            comment: row.comment.unwrap_or_default(),
            name: row.name,
            trip: row.trip,
            email: row.email,
            title: row.title,
            poster_hash: row.poster_hash,
            poster_country: row.poster_country,
            poster_ip: row.poster_ip,
            delpass: row.delpass,
            media: row.media.map(|media| Media::new(media, board, op, access)),

            comment_sanitized: Derived::default(),
            comment_processed: Derived::default(),
            title_processed: Derived::default(),
            name_processed: Derived::default(),
            email_processed: Derived::default(),
            trip_processed: Derived::default(),
            poster_hash_processed: Derived::default(),
            country_name_processed: Derived::default(),
            fourchan_date: Derived::default(),
            formatted: Derived::default(),
        }
    }

    pub fn key(&self) -> PostKey {
        PostKey::new(self.num, self.subnum)
    }

    pub fn register(&self, index: &mut PostIndex) {
        index.register(self.thread_num, self.key());
    }

    /// Drop what the viewer may not see. The deletion password never
    /// leaves the archive.
    pub fn clean_fields(&mut self, access: &dyn Access) {
        if !access.has_access("comment.see_ip") {
            self.poster_ip = None;
        }
        self.delpass = None;
    }

    /// Raw body with the legacy admin wrapper removed, escaped.
    pub fn comment_sanitized(&mut self) -> &str {
        let (comment, capcode) = (&self.comment, self.capcode);
        self.comment_sanitized.get_or_insert_with(|| {
            let stripped = format::strip_legacy_wrappers(comment, capcode);
            sanitize::sanitize_comment(stripped.as_bytes())
        })
    }

    pub fn comment_processed(&self) -> Option<&str> {
        self.comment_processed.ready().map(|html| html.as_str())
    }

    pub(crate) fn cache_comment(&mut self, html: String) -> &str {
        self.comment_processed.get_or_insert_with(|| html)
    }

    pub fn title_processed(&mut self) -> &str {
        let title = &self.title;
        self.title_processed.get_or_insert_with(|| processed(title))
    }

    pub fn name_processed(&mut self) -> &str {
        let name = &self.name;
        self.name_processed.get_or_insert_with(|| processed(name))
    }

    pub fn email_processed(&mut self) -> &str {
        let email = &self.email;
        self.email_processed.get_or_insert_with(|| processed(email))
    }

    pub fn trip_processed(&mut self) -> &str {
        let trip = &self.trip;
        self.trip_processed.get_or_insert_with(|| processed(trip))
    }

    pub fn poster_hash_processed(&mut self) -> &str {
        let hash = &self.poster_hash;
        self.poster_hash_processed.get_or_insert_with(|| processed(hash))
    }

    /// Country name for the poster's flag; `None` when the post has no
    /// country or the code is unknown.
    pub fn country_name_processed(&mut self, config: &Config) -> Option<&str> {
        let country = &self.poster_country;
        self.country_name_processed
            .get_or_insert_with(|| {
                country
                    .as_deref()
                    .filter(|code| !code.is_empty())
                    .and_then(|code| config.country_name(code))
                    .map(sanitize::process_field)
            })
            .as_deref()
    }

    pub fn fourchan_date(&mut self) -> &str {
        let timestamp = self.timestamp;
        self.fourchan_date
            .get_or_insert_with(|| format::fourchan_date(timestamp))
    }

    pub fn formatted(&self) -> Option<&str> {
        self.formatted.ready().map(|html| html.as_str())
    }

    pub(crate) fn cache_formatted(&mut self, html: String) -> &str {
        self.formatted.get_or_insert_with(|| html)
    }
}

/// Seconds after its last bump that a thread stops taking posts.
pub const THREAD_LIFETIME: i64 = 432_000;

/// Whether a thread can still be posted in, judged from its posts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadStatus {
    pub replies             : usize,
    pub images              : usize,
    pub last_bump           : i64,
    pub dead                : bool,
    pub closed              : bool,
    pub disable_image_upload: bool,
}

impl ThreadStatus {
    /// Fails when the posts do not include their thread's OP.
    pub fn check(posts: &[Post], board: &BoardConfig, now: i64) -> Result<ThreadStatus, ArchiveErr> {
        let mut op_present = false;
        let mut ghost_present = false;
        let mut status = ThreadStatus::default();

        for post in posts.iter() {
            if post.op {
                op_present = true;
            } else {
                status.replies += 1;
            }

            if post.subnum > 0 {
                ghost_present = true;
            } else {
                if !post.op && post.media.is_some() {
                    status.images += 1;
                }
                status.last_bump = status.last_bump.max(post.timestamp);
            }
        }

        if !op_present {
            return Err(ArchiveErr::new(ErrOrigin::Database, "Thread has no opening post"));
        }

        // scraped threads only ever take ghost replies
        status.dead = board.archive;
        status.disable_image_upload = board.archive;

        if now - status.last_bump > THREAD_LIFETIME || ghost_present {
            status.dead = true;
            status.disable_image_upload = true;
        }

        if status.replies >= board.max_posts_count {
            status.dead = true;
            status.disable_image_upload = true;
        } else if status.images >= board.max_images_count {
            status.disable_image_upload = true;
        }

        status.closed = board.disable_ghost && status.dead;

        Ok(status)
    }
}
