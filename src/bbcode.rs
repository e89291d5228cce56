//! Bracket-tag markup (`[b]bold[/b]`, `[code]...[/code]`, ...).
//!
//! Parsing builds an arena tree; rendering walks it and decides per node
//! whether the tag survives. Tags that are unclosed, misplaced or unknown
//! stay in the output as the text the poster typed.

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

/// Tags nested deeper than this are dropped, content kept. Counts the root.
const MAX_ANCESTORS: usize = 4;

/// `sub` and `sup` only render at the top level.
const MAX_SCRIPT_ANCESTORS: usize = 1;

/// Hard bound on tags per body, so hostile input cannot grow the tree
/// without limit.
pub const MAX_TAGS: usize = 2048;

lazy_static! {
    static ref TAG_TOKEN: Regex = Regex::new(r"\[(/?)([A-Za-z]{1,16})\]").expect("core regex failure");
    static ref PRE_BLOCK: Regex = Regex::new(r"(?s)<pre>(.*?)</pre>").expect("core regex failure");
    static ref STANDARD: Arc<TagGrammar> = Arc::new(TagGrammar::standard());
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarkupErr {
    #[error("body has more than {0} markup tags")]
    TooManyTags(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentModel {
    /// Content is kept as typed; no tags are recognised inside.
    Verbatim,
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFamily {
    Code,
    Script,
    Format,
}

#[derive(Debug, Clone)]
pub struct TagDef {
    pub name: &'static str,
    pub start: &'static str,
    pub end: &'static str,
    pub content: ContentModel,
    pub family: TagFamily,
    /// Tags inside which this one may not be opened.
    pub not_within: &'static [&'static str],
    /// Recognised only when special markup is enabled for the post.
    pub special: bool,
}

impl TagDef {
    fn format(name: &'static str, start: &'static str, end: &'static str) -> TagDef {
        TagDef {
            name,
            start,
            end,
            content: ContentModel::Inline,
            family: TagFamily::Format,
            not_within: &["code"],
            special: false,
        }
    }
}

/// The set of tags a body may use. Immutable once built.
#[derive(Debug, Clone)]
pub struct TagGrammar {
    tags: Vec<TagDef>,
}

type TagId = usize;
type NodeId = usize;

impl TagGrammar {
    pub fn standard() -> TagGrammar {
        let mut sub = TagDef::format("sub", "<sub>", "</sub>");
        sub.family = TagFamily::Script;
        let mut sup = TagDef::format("sup", "<sup>", "</sup>");
        sup.family = TagFamily::Script;

        TagGrammar {
            tags: vec![
                TagDef {
                    name: "code",
                    start: "<code>",
                    end: "</code>",
                    content: ContentModel::Verbatim,
                    family: TagFamily::Code,
                    not_within: &[],
                    special: false,
                },
                TagDef::format("spoiler", "<span class=\"spoiler\">", "</span>"),
                sub,
                sup,
                TagDef::format("b", "<b>", "</b>"),
                TagDef::format("i", "<em>", "</em>"),
                TagDef::format("m", "<tt class=\"code\">", "</tt>"),
                TagDef::format("o", "<span class=\"overline\">", "</span>"),
                TagDef::format("s", "<span class=\"strikethrough\">", "</span>"),
                TagDef::format("u", "<span class=\"underline\">", "</span>"),
                TagDef::format("expert", "<span class=\"expert\">", "</span>"),
                TagDef {
                    name: "moot",
                    start: "",
                    end: "",
                    content: ContentModel::Inline,
                    family: TagFamily::Format,
                    not_within: &[],
                    special: true,
                },
            ],
        }
    }

    /// The standard grammar, built once per process.
    pub fn shared() -> Arc<TagGrammar> {
        STANDARD.clone()
    }

    fn lookup(&self, name: &str, special: bool) -> Option<TagId> {
        self.tags
            .iter()
            .position(|t| t.name.eq_ignore_ascii_case(name) && (special || !t.special))
    }

    pub fn parse<'g>(&'g self, text: &str, special: bool) -> Result<Document<'g>, MarkupErr> {
        Parser::new(self, special).run(text)
    }

    /// Parse and render in one go.
    pub fn render(&self, text: &str, special: bool) -> Result<String, MarkupErr> {
        Ok(self.parse(text, special)?.render())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Child {
    Text(String),
    Node(NodeId),
}

#[derive(Debug)]
struct Node {
    /// None only for the root.
    tag: Option<TagId>,
    parent: Option<NodeId>,
    children: Vec<Child>,
    /// The opening tag as typed, restored if the tag is never closed.
    open_text: String,
}

/// Parsed body. Node 0 is the root.
#[derive(Debug)]
pub struct Document<'g> {
    grammar: &'g TagGrammar,
    nodes: Vec<Node>,
}

struct Parser<'g> {
    grammar: &'g TagGrammar,
    special: bool,
    nodes: Vec<Node>,
    /// Open nodes, root first.
    stack: Vec<NodeId>,
}

impl<'g> Parser<'g> {
    fn new(grammar: &'g TagGrammar, special: bool) -> Parser<'g> {
        Parser {
            grammar,
            special,
            nodes: vec![Node {
                tag: None,
                parent: None,
                children: vec![],
                open_text: String::new(),
            }],
            stack: vec![0],
        }
    }

    fn current(&self) -> NodeId {
        self.stack[self.stack.len() - 1]
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let cur = self.current();
        match self.nodes[cur].children.last_mut() {
            Some(Child::Text(prev)) => prev.push_str(text),
            _ => self.nodes[cur].children.push(Child::Text(text.to_string())),
        }
    }

    fn tag_of(&self, node: NodeId) -> Option<&'g TagDef> {
        let grammar = self.grammar;
        self.nodes[node].tag.map(|t| &grammar.tags[t])
    }

    fn may_open(&self, tag: &TagDef) -> bool {
        !self.stack.iter().any(|&open| match self.tag_of(open) {
            Some(def) => tag.not_within.contains(&def.name),
            None => false,
        })
    }

    fn open(&mut self, tag: TagId, typed: &str) -> Result<(), MarkupErr> {
        if self.nodes.len() > MAX_TAGS {
            return Err(MarkupErr::TooManyTags(MAX_TAGS));
        }
        let parent = self.current();
        let id = self.nodes.len();
        self.nodes.push(Node {
            tag: Some(tag),
            parent: Some(parent),
            children: vec![],
            open_text: typed.to_string(),
        });
        self.nodes[parent].children.push(Child::Node(id));
        self.stack.push(id);
        Ok(())
    }

    /// Turn the innermost open node back into text: its opening tag followed
    /// by its children, spliced into the parent.
    fn revert_top(&mut self) {
        if self.stack.len() <= 1 {
            return;
        }
        let id = match self.stack.pop() {
            Some(id) => id,
            None => return,
        };
        let parent = self.current();

        // an open node is always the last child of its parent
        self.nodes[parent].children.pop();
        let open_text = std::mem::take(&mut self.nodes[id].open_text);
        let children = std::mem::take(&mut self.nodes[id].children);

        self.push_text(&open_text);
        for child in children {
            match child {
                Child::Text(text) => self.push_text(&text),
                Child::Node(n) => {
                    self.nodes[n].parent = Some(parent);
                    self.nodes[parent].children.push(Child::Node(n));
                },
            }
        }
    }

    fn close(&mut self, name: &str, typed: &str) {
        let pos = self.stack.iter().rposition(|&open| match self.tag_of(open) {
            Some(def) => def.name.eq_ignore_ascii_case(name),
            None => false,
        });

        match pos {
            Some(pos) => {
                while self.stack.len() > pos + 1 {
                    self.revert_top();
                }
                self.stack.pop();
            },
            None => self.push_text(typed),
        }
    }

    fn run(mut self, text: &str) -> Result<Document<'g>, MarkupErr> {
        let mut last = 0;

        for caps in TAG_TOKEN.captures_iter(text) {
            let whole = match caps.get(0) {
                Some(m) => m,
                None => continue,
            };
            let closing = caps.get(1).map_or(false, |m| !m.as_str().is_empty());
            let name = caps.get(2).map_or("", |m| m.as_str());

            self.push_text(&text[last..whole.start()]);
            last = whole.end();

            let in_verbatim = self
                .tag_of(self.current())
                .map_or(false, |def| def.content == ContentModel::Verbatim);

            if in_verbatim {
                let closes_current = closing
                    && self
                        .tag_of(self.current())
                        .map_or(false, |def| def.name.eq_ignore_ascii_case(name));
                if closes_current {
                    self.stack.pop();
                } else {
                    self.push_text(whole.as_str());
                }
                continue;
            }

            if closing {
                self.close(name, whole.as_str());
                continue;
            }

            match self.grammar.lookup(name, self.special) {
                Some(tag) if self.may_open(&self.grammar.tags[tag]) => {
                    self.open(tag, whole.as_str())?;
                },
                _ => self.push_text(whole.as_str()),
            }
        }
        self.push_text(&text[last..]);

        while self.stack.len() > 1 {
            self.revert_top();
        }

        Ok(Document {
            grammar: self.grammar,
            nodes: self.nodes,
        })
    }
}

fn non_empty_lines(text: &str) -> usize {
    text.split(|c: char| c == '\n' || c == '\r')
        .filter(|line| !line.is_empty())
        .count()
}

impl<'g> Document<'g> {
    pub fn render(&self) -> String {
        self.render_node(0)
    }

    /// Number of ancestors of `id`, the root included.
    fn ancestors(&self, id: NodeId) -> usize {
        let mut count = 0;
        let mut cur = self.nodes[id].parent;
        while let Some(parent) = cur {
            count += 1;
            cur = self.nodes[parent].parent;
        }
        count
    }

    fn render_node(&self, id: NodeId) -> String {
        let node = &self.nodes[id];
        let mut content = String::new();
        for child in &node.children {
            match child {
                Child::Text(text) => content.push_str(text),
                Child::Node(n) => content.push_str(&self.render_node(*n)),
            }
        }

        let def = match node.tag {
            Some(t) => &self.grammar.tags[t],
            None => return content,
        };

        if content.is_empty() {
            return content;
        }

        if def.family == TagFamily::Code && non_empty_lines(&content) > 1 {
            return format!("<pre>{}</pre>", content);
        }

        let ancestors = self.ancestors(id);
        if def.family == TagFamily::Script && ancestors > MAX_SCRIPT_ANCESTORS {
            debug!("dropping nested [{}]", def.name);
            return content;
        }
        if ancestors > MAX_ANCESTORS {
            debug!("dropping [{}] nested {} deep", def.name, ancestors);
            return content;
        }

        format!("{}{}{}", def.start, content, def.end)
    }
}

/// Remove line breaks that were inserted inside `<pre>` blocks; block code
/// keeps the poster's own newlines.
pub fn strip_pre_breaks(html: &str) -> String {
    PRE_BLOCK
        .replace_all(html, |caps: &regex::Captures<'_>| {
            format!("<pre>{}</pre>", caps[1].replace("<br />", ""))
        })
        .into_owned()
}
