use crate::config::{BoardConfig, SiteConfig};
use crate::links::{LinkBuilder, Route};
use crate::sanitize;
use crate::site::{Access, Derived};
use serde::Deserialize;
use std::fmt;

/// Media metadata as stored alongside a post.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MediaRow {
    pub media_id      : u64,
    pub spoiler       : bool,
    pub preview_orig  : Option<String>,
    /// Stored file name of the full media.
    pub media         : Option<String>,
    pub preview_op    : Option<String>,
    pub preview_reply : Option<String>,
    pub preview_w     : u32,
    pub preview_h     : u32,
    /// File name as uploaded.
    pub media_filename: Option<String>,
    pub media_w       : u32,
    pub media_h       : u32,
    pub media_size    : u64,
    pub media_hash    : Option<String>,
    pub media_orig    : Option<String>,
    pub exif          : Option<String>,
    pub total         : u64,
    pub banned        : bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    Normal,
    Banned,
    Forbidden,
    NotAvailable,
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaStatus::Normal => "normal",
            MediaStatus::Banned => "banned",
            MediaStatus::Forbidden => "forbidden",
            MediaStatus::NotAvailable => "not-available",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Media {
    pub row   : MediaRow,
    pub op    : bool,
    board     : String,
    archive   : bool,
    images_url: Option<String>,
    status    : MediaStatus,

    safe_hash         : Derived<Option<String>>,
    filename_processed: Derived<String>,
    media_link        : Derived<Option<String>>,
    thumb_link        : Derived<Option<String>>,
    remote_link       : Derived<Option<String>>,
}

/// Normalise a stored hash to the URL-safe alphabet without padding.
pub fn safe_media_hash(hash: &str) -> String {
    let normalized = hash
        .trim_end_matches('=')
        .replace('+', "-")
        .replace('/', "_");

    match base64::decode_config(&normalized, base64::URL_SAFE_NO_PAD) {
        Ok(bytes) => base64::encode_config(bytes, base64::URL_SAFE_NO_PAD),
        Err(_) => normalized,
    }
}

/// Standard base64 form of a hash stored in either alphabet.
pub fn standard_media_hash(hash: &str) -> String {
    let safe = safe_media_hash(hash);
    match base64::decode_config(&safe, base64::URL_SAFE_NO_PAD) {
        Ok(bytes) => base64::encode(bytes),
        Err(_) => hash.to_string(),
    }
}

fn layout_path(board: &str, thumbnail: bool, image: &str) -> String {
    let prefix = image.get(..4).unwrap_or(image);
    let middle = image.get(4..6).unwrap_or("");
    format!(
        "{}/{}/{}/{}/{}",
        board,
        if thumbnail { "thumb" } else { "image" },
        prefix,
        middle,
        image,
    )
}

impl Media {
    /// Build media for a post. Banned media (without `media.see_banned`)
    /// and media on boards that hide thumbnails (without `media.see_hidden`)
    /// keep their status but lose every other field.
    pub fn new(mut row: MediaRow, board: &BoardConfig, op: bool, access: &dyn Access) -> Media {
        if board.archive {
            // archived file names arrive already encoded
            row.media_filename = row
                .media_filename
                .map(|name| html_escape::decode_html_entities(&name).into_owned());
        }

        if row.preview_w == 0 || row.preview_h == 0 {
            row.preview_w = 0;
            row.preview_h = 0;
        }

        let status = if row.banned {
            MediaStatus::Banned
        } else if board.hide_thumbnails && !access.has_access("media.see_hidden") {
            MediaStatus::Forbidden
        } else {
            MediaStatus::Normal
        };

        let redact = (row.banned && !access.has_access("media.see_banned"))
            || (board.hide_thumbnails && !access.has_access("media.see_hidden"));

        let mut media = Media {
            row,
            op,
            board: board.shortname.clone(),
            archive: board.archive,
            images_url: board.images_url.clone(),
            status,
            safe_hash: Derived::default(),
            filename_processed: Derived::default(),
            media_link: Derived::default(),
            thumb_link: Derived::default(),
            remote_link: Derived::default(),
        };

        if redact {
            media.redact();
        }

        media
    }

    fn redact(&mut self) {
        self.row = MediaRow::default();
        self.safe_hash = Derived::computed(None);
        self.media_link = Derived::computed(None);
        self.thumb_link = Derived::computed(None);
        self.remote_link = Derived::computed(None);
    }

    pub fn status(&self) -> MediaStatus {
        self.status
    }

    pub fn safe_hash(&mut self) -> Option<&str> {
        let hash = &self.row.media_hash;
        self.safe_hash
            .get_or_insert_with(|| hash.as_deref().map(safe_media_hash))
            .as_deref()
    }

    pub fn filename_processed(&mut self) -> &str {
        let name = &self.row.media_filename;
        self.filename_processed
            .get_or_insert_with(|| sanitize::process_field(name.as_deref().unwrap_or("")))
    }

    fn thumb_image(&self) -> Option<&str> {
        let (first, second) = if self.op {
            (&self.row.preview_op, &self.row.preview_reply)
        } else {
            (&self.row.preview_reply, &self.row.preview_op)
        };
        first.as_deref().or(second.as_deref())
    }

    fn link(&self, site: &SiteConfig, thumbnail: bool) -> Option<String> {
        let (image, thumbnail) = match (thumbnail, self.thumb_image(), self.row.media.as_deref()) {
            (true, Some(thumb), _) => (thumb, true),
            (_, _, Some(full)) => (full, false),
            _ => return None,
        };

        let path = layout_path(&self.board, thumbnail, image);
        let balancers = &site.media_balancers;
        if !balancers.is_empty() && self.row.media_id > 0 {
            let cdn = &balancers[(self.row.media_id % balancers.len() as u64) as usize];
            return Some(format!("{}/{}", cdn.trim_end_matches('/'), path));
        }

        Some(format!("{}/{}", site.media_url.trim_end_matches('/'), path))
    }

    pub fn media_link(&mut self, site: &SiteConfig) -> Option<&str> {
        if !self.media_link.is_ready() {
            let link = self.link(site, false);
            self.media_link = Derived::computed(link);
        }
        self.media_link.ready().and_then(|link| link.as_deref())
    }

    /// Thumbnail URL, falling back to the full media when there is no
    /// preview. Marks the media not available when neither exists.
    pub fn thumb_link(&mut self, site: &SiteConfig) -> Option<&str> {
        if !self.thumb_link.is_ready() {
            let link = self.link(site, true);
            if link.is_none() && self.status == MediaStatus::Normal {
                self.status = MediaStatus::NotAvailable;
            }
            self.thumb_link = Derived::computed(link);
        }
        self.thumb_link.ready().and_then(|link| link.as_deref())
    }

    /// Where the original file can be fetched. Archive boards send the
    /// viewer through the redirect route with the original file name.
    pub fn remote_link(&mut self, site: &SiteConfig, links: &dyn LinkBuilder) -> Option<&str> {
        if !self.remote_link.is_ready() {
            let link = if self.archive && self.images_url.as_deref() != Some("") {
                Some(format!(
                    "{}{}",
                    links.link(&self.board, Route::Redirect),
                    self.row.media_orig.as_deref().unwrap_or(""),
                ))
            } else {
                self.link(site, false)
            };
            self.remote_link = Derived::computed(link);
        }
        self.remote_link.ready().and_then(|link| link.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::SiteLinks;
    use crate::site::{Anonymous, Permissions};
    use pretty_assertions::assert_eq;

    fn sample_row() -> MediaRow {
        MediaRow {
            media_id: 3,
            media: Some("1362647100123.jpg".into()),
            preview_reply: Some("1362647100123s.jpg".into()),
            preview_w: 125,
            preview_h: 100,
            media_filename: Some("cat &amp; dog.jpg".into()),
            media_hash: Some("+/8P+hssPU5fYHGCk6S1xg==".into()),
            media_orig: Some("1362647100123.jpg".into()),
            ..MediaRow::default()
        }
    }

    fn archive_board() -> BoardConfig {
        let mut board = BoardConfig::new("a");
        board.archive = true;
        board
    }

    #[test]
    fn test_safe_media_hash() {
        assert_eq!(safe_media_hash("+/8P+hssPU5fYHGCk6S1xg=="), "-_8P-hssPU5fYHGCk6S1xg");
        assert_eq!(safe_media_hash("-_8P-hssPU5fYHGCk6S1xg"), "-_8P-hssPU5fYHGCk6S1xg");
        assert_eq!(standard_media_hash("-_8P-hssPU5fYHGCk6S1xg"), "+/8P+hssPU5fYHGCk6S1xg==");
    }

    #[test]
    fn test_links_use_hash_prefix_layout() {
        let mut site = SiteConfig::default();
        site.media_url = "https://img.example.org/".into();
        let mut media = Media::new(sample_row(), &archive_board(), false, &Anonymous);

        assert_eq!(
            media.media_link(&site),
            Some("https://img.example.org/a/image/1362/64/1362647100123.jpg")
        );
        assert_eq!(
            media.thumb_link(&site),
            Some("https://img.example.org/a/thumb/1362/64/1362647100123s.jpg")
        );
        assert_eq!(media.status(), MediaStatus::Normal);
    }

    #[test]
    fn test_balancer_chosen_by_media_id() {
        let mut site = SiteConfig::default();
        site.media_balancers = vec!["https://i0.example".into(), "https://i1.example".into()];
        let mut media = Media::new(sample_row(), &archive_board(), false, &Anonymous);

        assert_eq!(
            media.media_link(&site),
            Some("https://i1.example/a/image/1362/64/1362647100123.jpg")
        );
    }

    #[test]
    fn test_archive_filename_decoded_then_processed() {
        let mut media = Media::new(sample_row(), &archive_board(), false, &Anonymous);
        assert_eq!(media.row.media_filename.as_deref(), Some("cat & dog.jpg"));
        assert_eq!(media.filename_processed(), "cat &amp; dog.jpg");
    }

    #[test]
    fn test_remote_link_goes_through_redirect() {
        let links = SiteLinks::new("https://arch.example");
        let site = SiteConfig::default();
        let mut media = Media::new(sample_row(), &archive_board(), false, &Anonymous);

        assert_eq!(
            media.remote_link(&site, &links),
            Some("https://arch.example/a/redirect/1362647100123.jpg")
        );
    }

    #[test]
    fn test_banned_media_redacted() {
        let mut row = sample_row();
        row.banned = true;

        let mut media = Media::new(row.clone(), &archive_board(), false, &Anonymous);
        assert_eq!(media.status(), MediaStatus::Banned);
        assert_eq!(media.row, MediaRow::default());
        assert_eq!(media.safe_hash(), None);
        assert_eq!(media.media_link(&SiteConfig::default()), None);

        let moderator = Permissions::new(&["media.see_banned"]);
        let mut media = Media::new(row, &archive_board(), false, &moderator);
        assert_eq!(media.status(), MediaStatus::Banned);
        assert_eq!(media.safe_hash(), Some("-_8P-hssPU5fYHGCk6S1xg"));
    }

    #[test]
    fn test_hidden_thumbnails() {
        let mut board = archive_board();
        board.hide_thumbnails = true;

        let media = Media::new(sample_row(), &board, false, &Anonymous);
        assert_eq!(media.status(), MediaStatus::Forbidden);
        assert_eq!(media.row.media, None);

        let media = Media::new(sample_row(), &board, false, &Permissions::new(&["media.see_hidden"]));
        assert_eq!(media.status(), MediaStatus::Normal);
    }

    #[test]
    fn test_missing_previews() {
        let mut row = sample_row();
        row.preview_reply = None;
        row.preview_h = 0;
        let mut media = Media::new(row, &archive_board(), false, &Anonymous);

        assert_eq!(media.row.preview_w, 0);
        assert_eq!(
            media.thumb_link(&SiteConfig::default()),
            Some("/a/image/1362/64/1362647100123.jpg")
        );

        let mut bare = Media::new(MediaRow::default(), &archive_board(), true, &Anonymous);
        assert_eq!(bare.thumb_link(&SiteConfig::default()), None);
        assert_eq!(bare.status(), MediaStatus::NotAvailable);
        assert_eq!(bare.status().to_string(), "not-available");
    }
}
