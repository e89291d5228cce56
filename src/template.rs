use crate::util::{ArchiveErr, ErrOrigin};
use std::collections::HashMap;
use std::fs;
use std::mem;
use std::path::Path;

/// Comment box used when the theme does not supply one.
pub const DEFAULT_COMMENT_BOX: &str = r##"<article class="post{{op_class}}" id="{{key}}" data-board="{{board}}" data-thread-num="{{thread_num}}">
<header class="post_data"><h2 class="post_title">{{title}}</h2> <span class="post_author">{{name}}</span><span class="post_tripcode">{{trip}}</span> <span class="poster_hash">{{poster_hash}}</span> <span class="poster_country">{{country_name}}</span> <time datetime="{{datetime}}">{{date}}</time> <a href="#{{key}}" data-function="highlight" data-post="{{key}}">No.{{num}}</a></header>
<div class="text">{{comment}}</div>
<div class="backlink_list">{%backlink%}{{backlink.anchor}} {%backlink%}</div>
</article>"##;

/// Values and repeated collections a template is rendered against.
/// Collection items are looked up as `name.item.field`.
#[derive(Debug, Default)]
pub struct Data {
    values: HashMap<String, String>,
    collections: HashMap<String, Vec<String>>,
}

impl Data {
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// Append an item to `collection`, one value per field.
    pub fn push_item(&mut self, collection: &str, fields: &[(&str, &str)]) {
        let items = self.collections.entry(collection.to_string()).or_default();
        let item = items.len().to_string();
        for (field, value) in fields {
            self.values
                .insert(format!("{}.{}.{}", collection, item, field), value.to_string());
        }
        items.push(item);
    }
}

#[derive(Debug, PartialEq)]
pub enum Chunk {
    Fragment(String),
    Placeholder(String, Option<String>),
    /// Start of a `{%name%}` loop; `end` is the index of its closing chunk.
    LoopStart { name: String, end: usize },
    LoopEnd { name: String, start: usize },
}

#[derive(Debug)]
pub struct Template {
    chunks: Vec<Chunk>,
}

pub fn static_err(msg: &'static str) -> ArchiveErr {
    ArchiveErr::new(ErrOrigin::Template, msg)
}

enum State {
    Text,
    Brace,
    Placeholder,
    Control,
    Closing,
}

impl Template {
    pub fn render(&self, data: &Data) -> String {
        let mut buf = String::new();
        let mut cptr = 0;
        let mut ctrs: HashMap<&str, usize> = HashMap::new();

        while cptr < self.chunks.len() {
            match &self.chunks[cptr] {
                Chunk::Fragment(s) => buf.push_str(s),
                Chunk::Placeholder(name, None) => match name.as_str() {
                    "$VERSION" => buf.push_str(&format!("chanarchive v{}", env!("CARGO_PKG_VERSION"))),
                    _ => buf.push_str(data.values.get(name).map_or("", |v| v.as_str())),
                },
                Chunk::Placeholder(name, Some(obj)) => {
                    let item = ctrs
                        .get(obj.as_str())
                        .and_then(|ctr| data.collections.get(obj).and_then(|col| col.get(*ctr)));
                    if let Some(item) = item {
                        let valpath = format!("{}.{}.{}", obj, item, name);
                        buf.push_str(data.values.get(&valpath).map_or("", |v| v.as_str()));
                    }
                },
                Chunk::LoopStart { name, end } => {
                    let len = data.collections.get(name).map_or(0, |col| col.len());
                    if len == 0 {
                        cptr = *end;
                    } else {
                        ctrs.insert(name.as_str(), 0);
                    }
                },
                Chunk::LoopEnd { name, start } => {
                    if let Some(ctr) = ctrs.get_mut(name.as_str()) {
                        *ctr += 1;
                        let len = data.collections.get(name).map_or(0, |col| col.len());
                        if *ctr < len {
                            cptr = *start;
                        } else {
                            ctrs.remove(name.as_str());
                        }
                    }
                },
            }
            cptr += 1;
        }
        buf
    }

    pub fn from_string(string: &str) -> Result<Template, ArchiveErr> {
        let mut chunks = vec![];
        let mut open: Vec<(String, usize)> = vec![];
        let mut buf = String::new();
        let mut state = State::Text;

        for c in string.chars() {
            match state {
                State::Text => match c {
                    '{' => state = State::Brace,
                    _ => buf.push(c),
                },
                State::Brace => {
                    match c {
                        '{' => state = State::Placeholder,
                        '%' => state = State::Control,
                        _ => {
                            buf.push('{');
                            buf.push(c);
                            state = State::Text;
                        },
                    }
                    if !matches!(state, State::Text) && !buf.is_empty() {
                        chunks.push(Chunk::Fragment(mem::take(&mut buf)));
                    }
                },
                State::Placeholder => match c {
                    '}' => {
                        let raw = mem::take(&mut buf);
                        let split = raw.split('.').collect::<Vec<&str>>();
                        match split.len() {
                            1 => chunks.push(Chunk::Placeholder(raw, None)),
                            2 => chunks.push(Chunk::Placeholder(
                                split[1].to_string(),
                                Some(split[0].to_string()),
                            )),
                            _ => return Err(static_err("Bad placeholder syntax")),
                        }
                        state = State::Closing;
                    },
                    _ => buf.push(c),
                },
                State::Control => match c {
                    '%' => {
                        let name = mem::take(&mut buf);
                        let closes = open.last().map_or(false, |(top, _)| *top == name);
                        if closes {
                            let (name, start) = open.pop().unwrap_or_default();
                            let end = chunks.len();
                            if let Some(Chunk::LoopStart { end: start_end, .. }) = chunks.get_mut(start) {
                                *start_end = end;
                            }
                            chunks.push(Chunk::LoopEnd { name, start });
                        } else {
                            open.push((name.clone(), chunks.len()));
                            chunks.push(Chunk::LoopStart { name, end: 0 });
                        }
                        state = State::Closing;
                    },
                    _ => buf.push(c),
                },
                State::Closing => {
                    if c != '}' {
                        return Err(static_err("Invalid syntax"));
                    }
                    state = State::Text;
                },
            }
        }

        if !open.is_empty() {
            return Err(static_err("Unclosed loop"));
        }
        match state {
            State::Text => {},
            State::Brace => buf.push('{'),
            _ => return Err(static_err("Unterminated tag")),
        }
        if !buf.is_empty() {
            chunks.push(Chunk::Fragment(buf));
        }
        Ok(Template { chunks })
    }

    pub fn from_file(path: &Path) -> Result<Template, ArchiveErr> {
        match fs::read_to_string(path) {
            Ok(s) => Template::from_string(&s),
            Err(_) => Err(static_err("Could not read from template file")),
        }
    }

    pub fn comment_box() -> Template {
        Template::from_string(DEFAULT_COMMENT_BOX).unwrap_or(Template { chunks: vec![] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_placeholders() {
        let template = Template::from_string("<b>{{name}}</b> {{missing}}!").unwrap();
        let mut data = Data::default();
        data.insert("name", "Anonymous");
        assert_eq!(template.render(&data), "<b>Anonymous</b> !");
    }

    #[test]
    fn test_loops() {
        let template = Template::from_string("[{%item%}{{item.v}},{%item%}]").unwrap();
        let mut data = Data::default();
        data.push_item("item", &[("v", "a")]);
        data.push_item("item", &[("v", "b")]);
        assert_eq!(template.render(&data), "[a,b,]");
        assert_eq!(template.render(&Data::default()), "[]");
    }

    #[test]
    fn test_lone_brace_is_text() {
        let template = Template::from_string("a { b").unwrap();
        assert_eq!(template.render(&Data::default()), "a { b");
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(Template::from_string("{{a.b.c}}").unwrap_err().origin, ErrOrigin::Template);
        assert!(Template::from_string("{{a}x").is_err());
        assert!(Template::from_string("{%loop%}").is_err());
        assert!(Template::from_string("{{open").is_err());
    }

    #[test]
    fn test_default_comment_box_parses() {
        let template = Template::from_string(DEFAULT_COMMENT_BOX).unwrap();
        let mut data = Data::default();
        data.insert("comment", "hi");
        data.insert("key", "1000_1");
        data.push_item("backlink", &[("anchor", "<a>x</a>")]);
        let html = template.render(&data);
        assert!(html.contains("<div class=\"text\">hi</div>"));
        assert!(html.contains("<div class=\"backlink_list\"><a>x</a> </div>"));
        assert!(html.contains("<a href=\"#1000_1\" data-function=\"highlight\""));
        assert!(html.ends_with("</article>"));
    }
}
