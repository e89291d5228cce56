use crate::util;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::fmt;

/// Identity of a post within a board. Ghost posts have a non-zero subnum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostKey {
    pub num: u64,
    pub subnum: u64,
}

impl PostKey {
    pub fn new(num: u64, subnum: u64) -> PostKey {
        PostKey { num, subnum }
    }

    pub fn primary(num: u64) -> PostKey {
        PostKey { num, subnum: 0 }
    }

    /// Parse `123`, `123,4` or `123_4`.
    pub fn parse(s: &str) -> Option<PostKey> {
        util::split_post_number(s).map(|(num, subnum)| PostKey { num, subnum })
    }

    pub fn is_ghost(&self) -> bool {
        self.subnum != 0
    }

    /// The form posters type in references: `123` or `123,4`.
    pub fn comma(&self) -> String {
        if self.is_ghost() {
            format!("{},{}", self.num, self.subnum)
        } else {
            self.num.to_string()
        }
    }
}

/// Displays the fragment/attribute form: `123` or `123_4`.
impl fmt::Display for PostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ghost() {
            write!(f, "{}_{}", self.num, self.subnum)
        } else {
            write!(f, "{}", self.num)
        }
    }
}

/// Everything learned while rendering one batch of posts: which thread each
/// post lives in, and which posts reference which.
///
/// Threads are kept in registration order so that resolving a post number
/// that appears in several threads always picks the first one registered.
#[derive(Debug, Default)]
pub struct PostIndex {
    threads: IndexMap<u64, IndexSet<PostKey>>,
    backlinks: HashMap<PostKey, IndexMap<PostKey, String>>,
}

impl PostIndex {
    pub fn new() -> PostIndex {
        PostIndex::default()
    }

    pub fn register(&mut self, thread_num: u64, key: PostKey) {
        self.threads.entry(thread_num).or_default().insert(key);
    }

    pub fn is_registered(&self, thread_num: u64, key: PostKey) -> bool {
        self.threads
            .get(&thread_num)
            .map_or(false, |posts| posts.contains(&key))
    }

    /// True when `num` is the number of a thread seen in this batch.
    pub fn is_thread(&self, num: u64) -> bool {
        self.threads.contains_key(&num)
    }

    /// First registered thread containing `key`.
    pub fn thread_of(&self, key: PostKey) -> Option<u64> {
        self.threads
            .iter()
            .find(|(_, posts)| posts.contains(&key))
            .map(|(thread_num, _)| *thread_num)
    }

    /// Record that `referrer` links to `target`. Re-recording the same pair
    /// replaces the anchor rather than adding another one.
    pub fn record_backlink(&mut self, target: PostKey, referrer: PostKey, anchor: String) {
        self.backlinks
            .entry(target)
            .or_default()
            .insert(referrer, anchor);
    }

    /// Anchors pointing back at `target`, ascending by referencing post.
    pub fn backlinks_for(&self, target: PostKey) -> Vec<String> {
        match self.backlinks.get(&target) {
            Some(links) => {
                let mut sorted = links.iter().collect::<Vec<_>>();
                sorted.sort_by_key(|(referrer, _)| **referrer);
                sorted.into_iter().map(|(_, anchor)| anchor.clone()).collect()
            },
            None => vec![],
        }
    }

    pub fn backlink_count(&self, target: PostKey) -> usize {
        self.backlinks.get(&target).map_or(0, |links| links.len())
    }
}
