use crate::util::{ArchiveErr, ErrOrigin};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub fn static_err(msg: &'static str) -> ArchiveErr {
    ArchiveErr::new(ErrOrigin::Config, msg)
}

/// Site-wide settings shared by every board.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Prefix for generated links. Empty means site-relative links.
    pub base_url: String,
    /// Domain of the imageboard being archived; used for links to boards
    /// this archive does not carry.
    pub external_origin: String,
    pub media_url: String,
    pub media_balancers: Vec<String>,
    /// Offset of the archived site's clock from UTC.
    pub archive_utc_offset_hours: i64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig {
            base_url: String::new(),
            external_origin: String::from("4chan.org"),
            media_url: String::new(),
            media_balancers: vec![],
            archive_utc_offset_hours: -5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub shortname: String,
    pub name: String,
    /// Archived (scraped) board rather than a native one.
    pub archive: bool,
    pub hide_thumbnails: bool,
    /// Shift scraped timestamps from the origin's clock to UTC.
    pub adjust_timezone: bool,
    pub images_url: Option<String>,
    /// Replies after which a thread stops taking posts.
    pub max_posts_count: usize,
    /// Images after which a thread stops taking uploads.
    pub max_images_count: usize,
    /// Dead threads are closed outright instead of taking ghost replies.
    pub disable_ghost: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            shortname: String::new(),
            name: String::new(),
            archive: false,
            hide_thumbnails: false,
            adjust_timezone: true,
            images_url: None,
            max_posts_count: 400,
            max_images_count: 250,
            disable_ghost: false,
        }
    }
}

impl BoardConfig {
    pub fn new(shortname: &str) -> BoardConfig {
        BoardConfig {
            shortname: shortname.to_string(),
            name: shortname.to_string(),
            ..BoardConfig::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    /// Template for the comment box. The built-in one is used when unset.
    pub comment_template: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub boards: Vec<BoardConfig>,
    /// ISO country code to display name.
    pub countries: BTreeMap<String, String>,
    pub theme: ThemeConfig,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Config, ArchiveErr> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Config, ArchiveErr> {
        match fs::read_to_string(path) {
            Ok(text) => Config::from_toml(&text),
            Err(err) => Err(ArchiveErr::new(
                ErrOrigin::Config,
                format!("Could not read config file {}: {}", path.display(), err),
            )),
        }
    }

    fn validate(&self) -> Result<(), ArchiveErr> {
        let urls = [&self.site.base_url, &self.site.media_url]
            .into_iter()
            .chain(self.site.media_balancers.iter());

        for u in urls {
            if !u.is_empty() && url::Url::parse(u).is_err() {
                return Err(ArchiveErr::new(
                    ErrOrigin::Config,
                    format!("Invalid URL in site config: {}", u),
                ));
            }
        }

        for (i, board) in self.boards.iter().enumerate() {
            if board.shortname.is_empty() {
                return Err(static_err("Board with empty shortname"));
            }
            if self.boards[..i].iter().any(|b| b.shortname == board.shortname) {
                return Err(ArchiveErr::new(
                    ErrOrigin::Config,
                    format!("Duplicate board shortname: {}", board.shortname),
                ));
            }
        }

        Ok(())
    }

    pub fn board(&self, shortname: &str) -> Option<&BoardConfig> {
        self.boards.iter().find(|b| b.shortname == shortname)
    }

    pub fn country_name(&self, code: &str) -> Option<&str> {
        self.countries
            .get(&code.to_ascii_uppercase())
            .map(|name| name.as_str())
    }
}
