use crate::index::PostKey;
use crate::site::PostRow;
use crate::util::{ArchiveErr, ErrOrigin};

pub fn static_err(msg: &'static str) -> ArchiveErr {
    ArchiveErr::new(ErrOrigin::Database, msg)
}

/// Supplies stored post rows. The renderer never queries storage itself;
/// whoever drives it fetches rows through one of these.
pub trait PostSource {
    /// Shortnames of every board with stored threads.
    fn boards(&self) -> Result<Vec<String>, ArchiveErr>;

    /// Every row of a thread, opening post first, replies in post order.
    fn get_thread(&self, board: &str, thread_num: u64) -> Result<Vec<PostRow>, ArchiveErr>;

    fn get_post(&self, board: &str, key: PostKey) -> Result<PostRow, ArchiveErr>;
}
