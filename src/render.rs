use crate::autolink;
use crate::bbcode::{self, TagGrammar};
use crate::config::Config;
use crate::format;
use crate::index::{PostIndex, PostKey};
use crate::links::{self, LinkBuilder, LinkContext, SiteLinks};
use crate::media::MediaStatus;
use crate::site::{Access, Capcode, Post, PostRow, ThreadStatus};
use crate::template::{Data, Template};
use crate::util::{ArchiveErr, ErrOrigin};
use chrono::Utc;
use indexmap::IndexMap;
use log::{debug, trace, warn};
use std::sync::Arc;

/// Per-request switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Unknown references point into the current thread, which a live view
    /// may still receive.
    pub realtime: bool,
    /// Links to posts found in the batch are bare `#fragment`s.
    pub backlinks_hash_only_url: bool,
    /// Thread view used in generated links, e.g. `thread` or `last/50`.
    pub controller_method: String,
    /// Render every comment of a thread before collecting backlinks, so each
    /// post sees references from posts after it.
    pub prefetch_backlinks: bool,
    /// Strip fields the viewer may not see.
    pub clean: bool,
    /// Autolinked URLs open in a new window.
    pub popup_links: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            realtime: false,
            backlinks_hash_only_url: false,
            controller_method: String::from("thread"),
            prefetch_backlinks: true,
            clean: true,
            popup_links: false,
        }
    }
}

/// Where a comment is in its trip through the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Raw,
    Sanitized,
    ReferencesResolved,
    MarkupParsed,
    AutolinkApplied,
    Cached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFields {
    pub status     : MediaStatus,
    pub spoiler    : bool,
    pub safe_hash  : Option<String>,
    pub filename   : String,
    pub media_link : Option<String>,
    pub thumb_link : Option<String>,
    pub remote_link: Option<String>,
}

/// Display-ready versions of a post's other fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostFields {
    pub title        : String,
    pub name         : String,
    pub email        : String,
    pub trip         : String,
    pub poster_hash  : String,
    pub country_name : Option<String>,
    pub fourchan_date: String,
    pub capcode      : Capcode,
    pub media        : Option<MediaFields>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPost {
    pub key       : PostKey,
    pub thread_num: u64,
    pub op        : bool,
    pub timestamp : i64,
    pub html      : String,
    /// Anchors of posts referencing this one, as of the time of reading.
    pub backlinks : Vec<String>,
    pub fields    : PostFields,
    /// The full comment box, filled in once backlinks are final.
    pub formatted : Option<String>,
}

/// A thread ready for display. Replies are keyed `num`, ghosts `num_sub`.
#[derive(Debug, Clone)]
pub struct ThreadView {
    pub board     : String,
    pub thread_num: u64,
    pub op        : Option<RenderedPost>,
    pub posts     : IndexMap<String, RenderedPost>,
    pub status    : ThreadStatus,
}

pub struct Renderer {
    config     : Config,
    grammar    : Arc<TagGrammar>,
    links      : Box<dyn LinkBuilder + Send + Sync>,
    comment_box: Template,
    options    : RenderOptions,
}

impl Renderer {
    pub fn new(config: Config) -> Result<Renderer, ArchiveErr> {
        let comment_box = match &config.theme.comment_template {
            Some(path) => Template::from_file(path)?,
            None => Template::comment_box(),
        };
        let links = Box::new(SiteLinks::new(&config.site.base_url));

        Ok(Renderer {
            config,
            grammar: TagGrammar::shared(),
            links,
            comment_box,
            options: RenderOptions::default(),
        })
    }

    pub fn with_options(mut self, options: RenderOptions) -> Renderer {
        self.options = options;
        self
    }

    pub fn with_links(mut self, links: Box<dyn LinkBuilder + Send + Sync>) -> Renderer {
        self.links = links;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// A fresh index for one batch. Every post of the batch must be
    /// registered in it before any of them is rendered.
    pub fn new_batch_index(&self) -> PostIndex {
        PostIndex::new()
    }

    /// Render a post's comment and display fields, recording the backlinks
    /// its references create. Rendering again returns the cached comment.
    pub fn render(&self, post: &mut Post, index: &mut PostIndex) -> Result<RenderedPost, ArchiveErr> {
        let key = post.key();
        if !index.is_registered(post.thread_num, key) {
            return Err(ArchiveErr::new(
                ErrOrigin::Contract,
                format!(
                    "post /{}/{} rendered against an index it was never registered in",
                    post.board.shortname, key
                ),
            ));
        }

        let html = self.process_comment(post, index);
        let fields = self.fields(post);

        Ok(RenderedPost {
            key,
            thread_num: post.thread_num,
            op: post.op,
            timestamp: post.timestamp,
            html,
            backlinks: index.backlinks_for(key),
            fields,
            formatted: None,
        })
    }

    fn process_comment(&self, post: &mut Post, index: &mut PostIndex) -> String {
        let key = post.key();
        let archive = post.board.archive;
        // archive markup only ever applies to posts scraped from the origin
        let special = archive && !key.is_ghost();

        let mut stage = match post.comment_processed() {
            Some(_) => Stage::Cached,
            None => Stage::Raw,
        };
        let mut text = String::new();

        loop {
            trace!("/{}/{} at {:?}", post.board.shortname, key, stage);
            stage = match stage {
                Stage::Raw => {
                    text = post.comment_sanitized().to_string();
                    Stage::Sanitized
                },
                Stage::Sanitized => {
                    let ctx = LinkContext {
                        board: &post.board.shortname,
                        thread_num: post.thread_num,
                        key,
                        method: &self.options.controller_method,
                        realtime: self.options.realtime,
                        hash_only: self.options.backlinks_hash_only_url,
                        links: &*self.links,
                    };
                    text = links::link_internal(&text, &ctx, index);
                    text = links::link_external(&text, &ctx, &self.config);
                    text = format::greentext(&text);
                    Stage::ReferencesResolved
                },
                Stage::ReferencesResolved => {
                    match self.grammar.render(&text, special) {
                        Ok(html) => text = html,
                        Err(err) => warn!(
                            "/{}/{} left unformatted: {}",
                            post.board.shortname, key, err
                        ),
                    }
                    if special {
                        text = format::admin_markup(&text);
                    }
                    Stage::MarkupParsed
                },
                Stage::MarkupParsed => {
                    text = autolink::autolink(&text, self.options.popup_links);
                    Stage::AutolinkApplied
                },
                Stage::AutolinkApplied => {
                    let html = bbcode::strip_pre_breaks(&format::line_breaks(&text));
                    post.cache_comment(html);
                    Stage::Cached
                },
                Stage::Cached => break,
            };
        }

        match post.comment_processed() {
            Some(html) => html.to_string(),
            None => {
                debug!("/{}/{} has no cached comment", post.board.shortname, key);
                text
            },
        }
    }

    fn fields(&self, post: &mut Post) -> PostFields {
        let media = match post.media.as_mut() {
            Some(media) => {
                let media_link = media.media_link(&self.config.site).map(String::from);
                let thumb_link = media.thumb_link(&self.config.site).map(String::from);
                let remote_link = media
                    .remote_link(&self.config.site, &*self.links)
                    .map(String::from);
                Some(MediaFields {
                    spoiler: media.row.spoiler,
                    safe_hash: media.safe_hash().map(String::from),
                    filename: media.filename_processed().to_string(),
                    media_link,
                    thumb_link,
                    remote_link,
                    status: media.status(),
                })
            },
            None => None,
        };

        PostFields {
            title: post.title_processed().to_string(),
            name: post.name_processed().to_string(),
            email: post.email_processed().to_string(),
            trip: post.trip_processed().to_string(),
            poster_hash: post.poster_hash_processed().to_string(),
            country_name: post.country_name_processed(&self.config).map(String::from),
            fourchan_date: post.fourchan_date().to_string(),
            capcode: post.capcode,
            media,
        }
    }

    /// The post's comment box from the theme template. Computed once; call
    /// after the batch's backlinks are complete.
    pub fn format(&self, post: &mut Post, rendered: &RenderedPost) -> String {
        if let Some(html) = post.formatted() {
            return html.to_string();
        }

        let fields = &rendered.fields;
        let mut data = Data::default();
        data.insert("board", post.board.shortname.as_str());
        data.insert("key", rendered.key.to_string());
        data.insert("num", rendered.key.comma());
        data.insert("thread_num", rendered.thread_num.to_string());
        data.insert("op_class", if rendered.op { " op" } else { "" });
        data.insert("title", fields.title.as_str());
        data.insert("name", fields.name.as_str());
        data.insert("trip", fields.trip.as_str());
        data.insert("email", fields.email.as_str());
        data.insert("poster_hash", fields.poster_hash.as_str());
        data.insert("country_name", fields.country_name.as_deref().unwrap_or(""));
        data.insert("capcode", post.capcode.code());
        data.insert("datetime", format::utc_timestamp(rendered.timestamp));
        data.insert("date", fields.fourchan_date.as_str());
        data.insert("comment", rendered.html.as_str());
        for anchor in rendered.backlinks.iter() {
            data.push_item("backlink", &[("anchor", anchor.as_str())]);
        }

        post.cache_formatted(self.comment_box.render(&data)).to_string()
    }

    /// Render a single thread from its stored rows.
    pub fn render_thread(
        &self,
        board: &str,
        rows: Vec<PostRow>,
        access: &dyn Access,
    ) -> Result<ThreadView, ArchiveErr> {
        let mut views = self.render_threads(board, vec![rows], access)?;
        views
            .pop()
            .ok_or_else(|| ArchiveErr::new(ErrOrigin::Database, "empty thread batch"))
    }

    /// Render several threads of one board as a single batch: references
    /// between the threads resolve against each other.
    pub fn render_threads(
        &self,
        board: &str,
        threads: Vec<Vec<PostRow>>,
        access: &dyn Access,
    ) -> Result<Vec<ThreadView>, ArchiveErr> {
        let board = match self.config.board(board) {
            Some(board) => board,
            None => {
                return Err(ArchiveErr::new(
                    ErrOrigin::Config,
                    format!("No such board /{}/", board),
                ))
            },
        };

        let mut index = self.new_batch_index();
        let mut batch = threads
            .into_iter()
            .map(|rows| {
                rows.into_iter()
                    .map(|row| Post::from_row(row, board, &self.config, access))
                    .collect::<Vec<Post>>()
            })
            .collect::<Vec<_>>();

        let now = Utc::now().timestamp();
        let statuses = batch
            .iter()
            .map(|posts| ThreadStatus::check(posts, board, now))
            .collect::<Result<Vec<_>, ArchiveErr>>()?;

        for post in batch.iter_mut().flatten() {
            post.register(&mut index);
            if self.options.clean {
                post.clean_fields(access);
            }
        }

        let mut rendered = Vec::with_capacity(batch.len());
        for posts in batch.iter_mut() {
            let mut thread = Vec::with_capacity(posts.len());
            for post in posts.iter_mut() {
                let mut view = self.render(post, &mut index)?;
                if !self.options.prefetch_backlinks {
                    view.formatted = Some(self.format(post, &view));
                }
                thread.push(view);
            }
            rendered.push(thread);
        }

        let mut views = vec![];
        for ((posts, thread), status) in batch.iter_mut().zip(rendered).zip(statuses) {
            let mut view = ThreadView {
                board: board.shortname.clone(),
                thread_num: posts.first().map_or(0, |post| post.thread_num),
                op: None,
                posts: IndexMap::new(),
                status,
            };

            for (post, mut rendered) in posts.iter_mut().zip(thread) {
                if self.options.prefetch_backlinks {
                    rendered.backlinks = index.backlinks_for(rendered.key);
                    rendered.formatted = Some(self.format(post, &rendered));
                }

                if rendered.op && view.op.is_none() {
                    view.thread_num = rendered.key.num;
                    view.op = Some(rendered);
                } else {
                    view.posts.insert(rendered.key.to_string(), rendered);
                }
            }

            debug!(
                "Rendered /{}/{} with {} replies",
                view.board,
                view.thread_num,
                view.posts.len()
            );
            views.push(view);
        }

        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoardConfig;
    use crate::site::Anonymous;
    use pretty_assertions::assert_eq;

    fn renderer(archive: bool) -> Renderer {
        let mut config = Config::default();
        let mut board = BoardConfig::new("a");
        board.archive = archive;
        config.boards.push(board);
        Renderer::new(config).unwrap()
    }

    fn row(num: u64, subnum: u64, comment: &str) -> PostRow {
        PostRow {
            num,
            subnum,
            thread_num: 999,
            op: num == 999 && subnum == 0,
            comment: Some(comment.to_string()),
            ..PostRow::default()
        }
    }

    fn post(renderer: &Renderer, row: PostRow) -> Post {
        let board = renderer.config().board("a").unwrap().clone();
        Post::from_row(row, &board, renderer.config(), &Anonymous)
    }

    #[test]
    fn test_unregistered_post_is_contract_error() {
        let renderer = renderer(false);
        let mut index = renderer.new_batch_index();
        let mut p = post(&renderer, row(1000, 0, "hi"));

        let err = renderer.render(&mut p, &mut index).unwrap_err();
        assert_eq!(err.origin, ErrOrigin::Contract);
    }

    #[test]
    fn test_full_pipeline() {
        let renderer = renderer(false);
        let mut index = renderer.new_batch_index();
        let mut op = post(&renderer, row(999, 0, "op"));
        let mut reply = post(
            &renderer,
            row(1000, 0, ">>999\n>implying\n[b]bold[/b] http://example.com."),
        );
        op.register(&mut index);
        reply.register(&mut index);

        let out = renderer.render(&mut reply, &mut index).unwrap();
        assert_eq!(
            out.html,
            "<a href=\"/a/thread/999/#999\" class=\"backlink op\" data-function=\"highlight\" \
             data-backlink=\"true\" data-board=\"a\" data-post=\"999\">&gt;&gt;999</a><br />\n\
             <span class=\"greentext\">&gt;implying</span><br />\n\
             <b>bold</b> <a href=\"http://example.com\">http://example.com</a>."
        );
        assert_eq!(index.backlink_count(PostKey::primary(999)), 1);
    }

    #[test]
    fn test_render_is_idempotent() {
        let renderer = renderer(false);
        let mut index = renderer.new_batch_index();
        let mut p = post(&renderer, row(1000, 0, ">>999 >>999"));
        p.register(&mut index);

        let first = renderer.render(&mut p, &mut index).unwrap();
        let second = renderer.render(&mut p, &mut index).unwrap();
        assert_eq!(first.html, second.html);
        assert_eq!(index.backlink_count(PostKey::primary(999)), 1);
    }

    #[test]
    fn test_archive_markup_only_on_primary_posts() {
        let renderer = renderer(true);
        let mut index = renderer.new_batch_index();
        let mut scraped = post(&renderer, row(1000, 0, "[banned]x[/banned] [moot]y[/moot]"));
        let mut ghost = post(&renderer, row(1000, 1, "[banned]x[/banned] [moot]y[/moot]"));
        scraped.register(&mut index);
        ghost.register(&mut index);

        assert_eq!(
            renderer.render(&mut scraped, &mut index).unwrap().html,
            "<span class=\"banned\">x</span> y"
        );
        assert_eq!(
            renderer.render(&mut ghost, &mut index).unwrap().html,
            "[banned]x[/banned] [moot]y[/moot]"
        );
    }

    #[test]
    fn test_thread_view() {
        let renderer = renderer(false);
        let rows = vec![
            row(999, 0, "op post"),
            row(1000, 0, ">>999"),
            row(1000, 1, ">>1000 ghost reply"),
        ];

        let view = renderer.render_thread("a", rows, &Anonymous).unwrap();
        let op = view.op.as_ref().unwrap();
        assert_eq!(view.thread_num, 999);
        assert_eq!(op.backlinks.len(), 1);
        assert_eq!(view.posts.keys().collect::<Vec<_>>(), vec!["1000", "1000_1"]);
        assert_eq!(view.posts["1000"].backlinks.len(), 1);
        assert!(view.posts["1000"].backlinks[0].ends_with("&gt;&gt;1000,1</a>"));

        let formatted = op.formatted.as_deref().unwrap();
        assert!(formatted.contains("<div class=\"text\">op post</div>"));
        assert!(formatted.contains(&op.backlinks[0]));
    }

    #[test]
    fn test_single_pass_backlinks() {
        let options = RenderOptions {
            prefetch_backlinks: false,
            ..RenderOptions::default()
        };
        let renderer = renderer(false).with_options(options);
        let rows = vec![row(999, 0, "op post"), row(1000, 0, ">>999")];

        let view = renderer.render_thread("a", rows, &Anonymous).unwrap();
        assert!(view.op.unwrap().backlinks.is_empty());
    }

    #[test]
    fn test_thread_status_attached() {
        let renderer = renderer(true);
        let rows = vec![row(999, 0, "op post"), row(1000, 0, "reply")];

        let view = renderer.render_thread("a", rows, &Anonymous).unwrap();
        assert_eq!(view.status.replies, 1);
        assert!(view.status.dead);
        assert!(view.status.disable_image_upload);
        assert!(!view.status.closed);
    }

    #[test]
    fn test_thread_without_op_is_rejected() {
        let renderer = renderer(false);
        let err = renderer
            .render_thread("a", vec![row(1000, 0, "orphan")], &Anonymous)
            .unwrap_err();
        assert_eq!(err.origin, ErrOrigin::Database);
    }

    #[test]
    fn test_unknown_board() {
        let renderer = renderer(false);
        let err = renderer.render_thread("zz", vec![], &Anonymous).unwrap_err();
        assert_eq!(err.origin, ErrOrigin::Config);
    }
}
