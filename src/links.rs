use crate::config::Config;
use crate::index::{PostIndex, PostKey};
use lazy_static::lazy_static;
use log::trace;
use regex::{Captures, Regex};

lazy_static! {
    static ref INTERNAL_LINK: Regex =
        Regex::new(r"&gt;&gt;(\d+(?:,\d+)?)").expect("core regex failure");
    static ref EXTERNAL_LINK: Regex =
        Regex::new(r"&gt;&gt;&gt;(/(\w+)/([\w-]+(?:,\d+)?)?(/?))").expect("core regex failure");
}

/// Application routes a post body may link to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Board,
    /// A thread page; `method` is the thread view, e.g. `thread` or `last/50`.
    Thread { method: &'a str, num: u64 },
    /// Resolve-a-post redirect; takes `123`, `123_4` or anything else typed
    /// after a cross-board reference.
    Post(&'a str),
    Redirect,
}

/// Turns routes into URLs. Routing is owned by the web layer; the renderer
/// only asks for links.
pub trait LinkBuilder {
    fn link(&self, board: &str, route: Route<'_>) -> String;
}

/// Links of the form `{base}/{board}/{method}/{num}/`.
#[derive(Debug, Clone, Default)]
pub struct SiteLinks {
    base: String,
}

impl SiteLinks {
    pub fn new(base_url: &str) -> SiteLinks {
        SiteLinks {
            base: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl LinkBuilder for SiteLinks {
    fn link(&self, board: &str, route: Route<'_>) -> String {
        match route {
            Route::Board => format!("{}/{}/", self.base, board),
            Route::Thread { method, num } => format!("{}/{}/{}/{}/", self.base, board, method, num),
            Route::Post(key) => format!("{}/{}/post/{}/", self.base, board, key),
            Route::Redirect => format!("{}/{}/redirect/", self.base, board),
        }
    }
}

/// Where a `>>N` reference points. Checked in declaration order; the first
/// that applies wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The target opens a thread seen in this batch.
    OriginatingPost,
    /// The target was registered under this thread.
    KnownThread(u64),
    /// Not seen yet, but a live view may receive it into the current thread.
    Realtime,
    Unresolved,
}

/// The post whose body is being linked, and how its links should look.
pub struct LinkContext<'a> {
    pub board: &'a str,
    pub thread_num: u64,
    pub key: PostKey,
    pub method: &'a str,
    pub realtime: bool,
    /// Emit bare `#fragment` links for posts found in the batch.
    pub hash_only: bool,
    pub links: &'a dyn LinkBuilder,
}

/// A reference found in a post body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceToken {
    Internal {
        target: PostKey,
        /// Text as typed, e.g. `123,4`.
        label: String,
    },
    External {
        /// Everything after `>>>`, e.g. `/a/123/`.
        link: String,
        board: String,
        query: Option<String>,
    },
}

impl ReferenceToken {
    fn internal(caps: &Captures<'_>) -> Option<ReferenceToken> {
        let label = caps.get(1)?.as_str();
        let target = PostKey::parse(label)?;
        Some(ReferenceToken::Internal {
            target,
            label: label.to_string(),
        })
    }

    fn external(caps: &Captures<'_>) -> Option<ReferenceToken> {
        Some(ReferenceToken::External {
            link: caps.get(1)?.as_str().to_string(),
            board: caps.get(2)?.as_str().to_string(),
            query: caps
                .get(3)
                .map(|q| q.as_str().to_string())
                .filter(|q| !q.is_empty()),
        })
    }
}

pub fn resolve(target: PostKey, ctx: &LinkContext<'_>, index: &PostIndex) -> Resolution {
    if !target.is_ghost() && index.is_thread(target.num) {
        return Resolution::OriginatingPost;
    }

    if let Some(thread_num) = index.thread_of(target) {
        return Resolution::KnownThread(thread_num);
    }

    if ctx.realtime {
        return Resolution::Realtime;
    }

    Resolution::Unresolved
}

fn backlink_attrs(board: &str, post: PostKey, op: bool) -> String {
    format!(
        "class=\"backlink{}\" data-function=\"highlight\" data-backlink=\"true\" data-board=\"{}\" data-post=\"{}\"",
        if op { " op" } else { "" },
        board,
        post,
    )
}

fn internal_anchor(
    target: PostKey,
    label: &str,
    resolution: Resolution,
    ctx: &LinkContext<'_>,
) -> String {
    let thread_link = |num: u64| {
        ctx.links.link(ctx.board, Route::Thread { method: ctx.method, num })
    };

    let (href, op) = match resolution {
        Resolution::OriginatingPost if ctx.hash_only => (format!("#{}", target), true),
        Resolution::OriginatingPost => (format!("{}#{}", thread_link(target.num), target), true),
        Resolution::KnownThread(_) if ctx.hash_only => (format!("#{}", target), false),
        Resolution::KnownThread(num) => (format!("{}#{}", thread_link(num), target), false),
        Resolution::Realtime => (format!("{}#{}", thread_link(ctx.thread_num), target), false),
        Resolution::Unresolved => {
            let key = target.to_string();
            (ctx.links.link(ctx.board, Route::Post(&key)), false)
        },
    };

    format!(
        "<a href=\"{}\" {}>&gt;&gt;{}</a>",
        href,
        backlink_attrs(ctx.board, target, op),
        label,
    )
}

/// Anchor shown on the target post, pointing back at the referencing one.
fn backlink_anchor(ctx: &LinkContext<'_>) -> String {
    let thread = ctx.links.link(
        ctx.board,
        Route::Thread {
            method: ctx.method,
            num:    ctx.thread_num,
        },
    );

    format!(
        "<a href=\"{}#{}\" {}>&gt;&gt;{}</a>",
        thread,
        ctx.key,
        backlink_attrs(ctx.board, ctx.key, false),
        ctx.key.comma(),
    )
}

/// Rewrite every `&gt;&gt;N` in escaped text into an anchor, recording a
/// backlink for each target in the index.
pub fn link_internal(text: &str, ctx: &LinkContext<'_>, index: &mut PostIndex) -> String {
    INTERNAL_LINK
        .replace_all(text, |caps: &Captures<'_>| {
            match ReferenceToken::internal(caps) {
                Some(ReferenceToken::Internal { target, label }) => {
                    index.record_backlink(target, ctx.key, backlink_anchor(ctx));

                    let resolution = resolve(target, ctx, index);
                    trace!("{} references {} as {:?}", ctx.key, target, resolution);
                    internal_anchor(target, &label, resolution, ctx)
                },
                // digits too long for a post number
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Rewrite every `&gt;&gt;&gt;/board/query` in escaped text. Boards this
/// archive does not carry link to the origin imageboard.
pub fn link_external(text: &str, ctx: &LinkContext<'_>, config: &Config) -> String {
    EXTERNAL_LINK
        .replace_all(text, |caps: &Captures<'_>| {
            let (link, board, query) = match ReferenceToken::external(caps) {
                Some(ReferenceToken::External { link, board, query }) => (link, board, query),
                _ => return caps[0].to_string(),
            };

            match (config.board(&board), query) {
                (None, Some(query)) => format!(
                    "<a href=\"//boards.{}/{}/res/{}\">&gt;&gt;&gt;{}</a>",
                    config.site.external_origin, board, query, link,
                ),
                (None, None) => format!(
                    "<a href=\"//boards.{}/{}/\">&gt;&gt;&gt;{}</a>",
                    config.site.external_origin, board, link,
                ),
                (Some(target), Some(query)) => format!(
                    "<a href=\"{}\" class=\"backlink\" data-function=\"highlight\" data-backlink=\"true\" data-board=\"{}\" data-post=\"{}\">&gt;&gt;&gt;{}</a>",
                    ctx.links.link(&target.shortname, Route::Post(&query)),
                    target.shortname,
                    query,
                    link,
                ),
                (Some(target), None) => format!(
                    "<a href=\"{}\">&gt;&gt;&gt;{}</a>",
                    ctx.links.link(&target.shortname, Route::Board),
                    link,
                ),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoardConfig;
    use pretty_assertions::assert_eq;

    fn context<'a>(links: &'a SiteLinks, key: PostKey, realtime: bool) -> LinkContext<'a> {
        LinkContext {
            board: "a",
            thread_num: 999,
            key,
            method: "thread",
            realtime,
            hash_only: false,
            links,
        }
    }

    #[test]
    fn test_site_links() {
        let links = SiteLinks::new("https://arch.example/");
        assert_eq!(links.link("a", Route::Board), "https://arch.example/a/");
        assert_eq!(
            links.link("a", Route::Thread { method: "last/50", num: 3 }),
            "https://arch.example/a/last/50/3/"
        );
        assert_eq!(links.link("a", Route::Post("3_1")), "https://arch.example/a/post/3_1/");
    }

    #[test]
    fn test_resolution_order() {
        let links = SiteLinks::new("");
        let mut index = PostIndex::new();
        index.register(999, PostKey::primary(999));
        index.register(999, PostKey::primary(1001));
        index.register(500, PostKey::primary(500));
        index.register(500, PostKey::new(501, 2));

        let ctx = context(&links, PostKey::primary(1002), false);
        assert_eq!(resolve(PostKey::primary(999), &ctx, &index), Resolution::OriginatingPost);
        assert_eq!(resolve(PostKey::primary(500), &ctx, &index), Resolution::OriginatingPost);
        assert_eq!(resolve(PostKey::primary(1001), &ctx, &index), Resolution::KnownThread(999));
        assert_eq!(resolve(PostKey::new(501, 2), &ctx, &index), Resolution::KnownThread(500));
        assert_eq!(resolve(PostKey::primary(7), &ctx, &index), Resolution::Unresolved);

        let live = context(&links, PostKey::primary(1002), true);
        assert_eq!(resolve(PostKey::primary(7), &live, &index), Resolution::Realtime);
        assert_eq!(resolve(PostKey::primary(1001), &live, &index), Resolution::KnownThread(999));
    }

    #[test]
    fn test_internal_link_in_same_thread() {
        let links = SiteLinks::new("");
        let mut index = PostIndex::new();
        index.register(999, PostKey::primary(999));
        index.register(999, PostKey::primary(123));

        let ctx = context(&links, PostKey::primary(1000), false);
        let out = link_internal("&gt;&gt;123 agreed", &ctx, &mut index);

        assert_eq!(
            out,
            "<a href=\"/a/thread/999/#123\" class=\"backlink\" data-function=\"highlight\" \
             data-backlink=\"true\" data-board=\"a\" data-post=\"123\">&gt;&gt;123</a> agreed"
        );
        assert_eq!(
            index.backlinks_for(PostKey::primary(123)),
            vec![
                "<a href=\"/a/thread/999/#1000\" class=\"backlink\" data-function=\"highlight\" \
                 data-backlink=\"true\" data-board=\"a\" data-post=\"1000\">&gt;&gt;1000</a>"
            ]
        );
    }

    #[test]
    fn test_hash_only_and_op_links() {
        let links = SiteLinks::new("");
        let mut index = PostIndex::new();
        index.register(999, PostKey::primary(999));

        let mut ctx = context(&links, PostKey::new(1000, 1), false);
        ctx.hash_only = true;
        let out = link_internal("&gt;&gt;999", &ctx, &mut index);

        assert!(out.starts_with("<a href=\"#999\" class=\"backlink op\""));
        let back = index.backlinks_for(PostKey::primary(999));
        assert_eq!(back.len(), 1);
        assert!(back[0].contains("href=\"/a/thread/999/#1000_1\""));
        assert!(back[0].ends_with("&gt;&gt;1000,1</a>"));
    }

    #[test]
    fn test_ghost_reference_and_fallbacks() {
        let links = SiteLinks::new("");
        let mut index = PostIndex::new();

        let ctx = context(&links, PostKey::primary(1), false);
        let out = link_internal("&gt;&gt;77,3", &ctx, &mut index);
        assert!(out.starts_with("<a href=\"/a/post/77_3/\""));
        assert!(out.contains("data-post=\"77_3\""));
        assert!(out.ends_with("&gt;&gt;77,3</a>"));

        let live = context(&links, PostKey::primary(1), true);
        let out = link_internal("&gt;&gt;77", &live, &mut index);
        assert!(out.starts_with("<a href=\"/a/thread/999/#77\""));
    }

    #[test]
    fn test_oversized_number_left_alone() {
        let links = SiteLinks::new("");
        let mut index = PostIndex::new();
        let ctx = context(&links, PostKey::primary(1), false);
        let text = "&gt;&gt;99999999999999999999999";
        assert_eq!(link_internal(text, &ctx, &mut index), text);
    }

    #[test]
    fn test_external_links() {
        let links = SiteLinks::new("");
        let mut config = Config::default();
        config.boards.push(BoardConfig::new("g"));
        let ctx = context(&links, PostKey::primary(1), false);

        assert_eq!(
            link_external("&gt;&gt;&gt;/pol/456", &ctx, &config),
            "<a href=\"//boards.4chan.org/pol/res/456\">&gt;&gt;&gt;/pol/456</a>"
        );
        assert_eq!(
            link_external("&gt;&gt;&gt;/pol/", &ctx, &config),
            "<a href=\"//boards.4chan.org/pol/\">&gt;&gt;&gt;/pol/</a>"
        );
        assert_eq!(
            link_external("&gt;&gt;&gt;/g/", &ctx, &config),
            "<a href=\"/g/\">&gt;&gt;&gt;/g/</a>"
        );
        assert_eq!(
            link_external("&gt;&gt;&gt;/g/42,1", &ctx, &config),
            "<a href=\"/g/post/42,1/\" class=\"backlink\" data-function=\"highlight\" \
             data-backlink=\"true\" data-board=\"g\" data-post=\"42,1\">&gt;&gt;&gt;/g/42,1</a>"
        );
    }
}
