pub mod autolink;
pub mod bbcode;
pub mod config;
pub mod console;
pub mod db;
pub mod format;
pub mod fsdb;
pub mod index;
pub mod links;
pub mod media;
pub mod render;
pub mod sanitize;
pub mod site;
pub mod template;
pub mod util;

pub use config::Config;
pub use index::{PostIndex, PostKey};
pub use render::{RenderOptions, RenderedPost, Renderer, ThreadView};
pub use site::{Access, Post, PostRow};
pub use util::{ArchiveErr, ErrOrigin};
