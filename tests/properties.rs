use chanarchive::bbcode::TagGrammar;
use chanarchive::config::{BoardConfig, Config};
use chanarchive::links::{self, LinkContext, Resolution, SiteLinks};
use chanarchive::render::Renderer;
use chanarchive::site::{Anonymous, Post, PostRow};
use chanarchive::{PostIndex, PostKey};
use lazy_static::lazy_static;
use pretty_assertions::assert_eq;
use regex::Regex;
use rstest::rstest;

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref BB_TAG: Regex =
        Regex::new(r"(?i)\[/?(b|i|u|s|o|m|code|spoiler|sub|sup|expert)\]").unwrap();
}

fn renderer() -> Renderer {
    let mut config = Config::default();
    config.boards.push(BoardConfig::new("a"));
    Renderer::new(config).unwrap()
}

fn render(renderer: &Renderer, index: &mut PostIndex, body: &str) -> (Post, String) {
    let board = renderer.config().board("a").unwrap().clone();
    let row = PostRow {
        num: 1000,
        thread_num: 999,
        comment: Some(body.to_string()),
        ..PostRow::default()
    };
    let mut post = Post::from_row(row, &board, renderer.config(), &Anonymous);
    post.register(index);
    let html = renderer.render(&mut post, index).unwrap().html;
    (post, html)
}

#[rstest]
#[case(">>999 >>999 >>12,3")]
#[case("[b]bold [i]nested[/i][/b]\n>quote")]
#[case("see http://example.com and >>>/g/1")]
#[case("[code]a\nb[/code] tail")]
fn render_twice_is_identical(#[case] body: &str) {
    let renderer = renderer();
    let mut index = renderer.new_batch_index();
    let (mut post, first) = render(&renderer, &mut index, body);
    let count = index.backlink_count(PostKey::primary(999));

    let second = renderer.render(&mut post, &mut index).unwrap().html;
    assert_eq!(first, second);
    assert_eq!(index.backlink_count(PostKey::primary(999)), count);
}

#[rstest]
#[case("plain & simple < text > \"quoted\"")]
#[case("[b]bold[/b] and [spoiler]hidden [i]deep[/i][/spoiler]")]
#[case(">greentext line\nnormal line\n>another")]
#[case("[sup]up[/sup] x [code]let a = 1 < 2;[/code]")]
#[case("a &amp; b &lt; c")]
fn markup_strips_back_to_text(#[case] body: &str) {
    let renderer = renderer();
    let mut index = renderer.new_batch_index();
    let (_, html) = render(&renderer, &mut index, body);

    let text = HTML_TAG.replace_all(&html, "");
    let text = html_escape::decode_html_entities(&text);
    let expected = BB_TAG.replace_all(body, "");
    let expected = html_escape::decode_html_entities(&expected);
    assert_eq!(text, expected.trim());
}

#[test]
fn five_deep_tag_is_stripped() {
    let grammar = TagGrammar::shared();
    let html = grammar
        .render("[b][b][b][b][b]deep[/b][/b][/b][/b][/b]", false)
        .unwrap();
    assert_eq!(html, "<b><b><b><b>deep</b></b></b></b>");

    let html = grammar
        .render("[s][s][s][s][s][s]deeper[/s][/s][/s][/s][/s][/s]", false)
        .unwrap();
    assert_eq!(html.matches("<span").count(), 4);
    assert!(html.contains("deeper"));
}

#[test]
fn exactly_one_resolution_branch() {
    let links = SiteLinks::new("");
    let mut index = PostIndex::new();
    index.register(999, PostKey::primary(999));
    index.register(999, PostKey::primary(123));
    index.register(999, PostKey::primary(1000));

    let ctx = LinkContext {
        board: "a",
        thread_num: 999,
        key: PostKey::primary(1000),
        method: "thread",
        realtime: false,
        hash_only: true,
        links: &links,
    };

    let cases = [
        (PostKey::primary(999), Resolution::OriginatingPost, "#999"),
        (PostKey::primary(123), Resolution::KnownThread(999), "#123"),
        (PostKey::primary(55), Resolution::Unresolved, "/a/post/55/"),
    ];
    for (target, expected, href) in cases {
        assert_eq!(links::resolve(target, &ctx, &index), expected);
        let html = links::link_internal(&format!("&gt;&gt;{}", target.comma()), &ctx, &mut index);
        assert!(html.starts_with(&format!("<a href=\"{}\"", href)), "{}", html);
        assert_eq!(html.matches("<a ").count(), 1);
    }
}

#[test]
fn backlinks_ordered_by_referrer() {
    let renderer = renderer();
    let rows = vec![
        PostRow { num: 999, thread_num: 999, op: true, ..PostRow::default() },
        PostRow { num: 1005, thread_num: 999, comment: Some(">>999".into()), ..PostRow::default() },
        PostRow { num: 1001, subnum: 2, thread_num: 999, comment: Some(">>999".into()), ..PostRow::default() },
        PostRow { num: 1001, thread_num: 999, comment: Some(">>999".into()), ..PostRow::default() },
    ];

    let view = renderer.render_thread("a", rows, &Anonymous).unwrap();
    let labels = view
        .op
        .unwrap()
        .backlinks
        .iter()
        .map(|b| HTML_TAG.replace_all(b, "").into_owned())
        .collect::<Vec<_>>();
    assert_eq!(labels, vec!["&gt;&gt;1001", "&gt;&gt;1001,2", "&gt;&gt;1005"]);
}

#[test]
fn invalid_utf8_never_fails() {
    let text = chanarchive::sanitize::sanitize_comment(b"ok \xff\xfe <b>");
    assert_eq!(text, "ok  &lt;b&gt;");
}
