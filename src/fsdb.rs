use crate::db::{self, PostSource};
use crate::index::PostKey;
use crate::sanitize;
use crate::site::PostRow;
use crate::util::{self, ArchiveErr, ErrOrigin};
use log::debug;
use serde::Deserialize;
use std::fs::{self, read_dir};
use std::path::{Path, PathBuf};

/// Thread dumps laid out as `<root>/<board>/<thread_num>.toml`, each
/// holding a `[[posts]]` array.
#[derive(Debug)]
pub struct FSSource {
    root: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct ThreadDump {
    #[serde(default)]
    posts: Vec<PostRow>,
}

fn valid_board(board: &str) -> bool {
    !board.is_empty() && board.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl FSSource {
    pub fn from_root(root: &Path) -> Result<FSSource, ArchiveErr> {
        if !root.is_dir() {
            return Err(ArchiveErr::new(
                ErrOrigin::Database,
                format!("Archive root {} is not a directory", root.display()),
            ));
        }
        Ok(FSSource {
            root: root.to_path_buf(),
        })
    }

    fn board_dir(&self, board: &str) -> Result<PathBuf, ArchiveErr> {
        if !valid_board(board) {
            return Err(db::static_err("Invalid board shortname"));
        }
        Ok(self.root.join(board))
    }

    fn thread_nums(&self, board: &str) -> Result<Vec<u64>, ArchiveErr> {
        let mut nums = vec![];
        for entry in read_dir(self.board_dir(board)?)? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "toml") {
                continue;
            }
            match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(stem) if util::is_natural(stem) => {
                    if let Ok(num) = stem.parse::<u64>() {
                        nums.push(num);
                    }
                },
                _ => debug!("Skipping unrecognised dump {}", path.display()),
            }
        }
        nums.sort_unstable();
        Ok(nums)
    }
}

impl PostSource for FSSource {
    fn boards(&self) -> Result<Vec<String>, ArchiveErr> {
        let mut boards = vec![];
        for entry in read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                if valid_board(&name) {
                    boards.push(name);
                }
            }
        }
        boards.sort();
        Ok(boards)
    }

    fn get_thread(&self, board: &str, thread_num: u64) -> Result<Vec<PostRow>, ArchiveErr> {
        let path = self.board_dir(board)?.join(format!("{}.toml", thread_num));
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => {
                return Err(ArchiveErr::new(
                    ErrOrigin::Database,
                    format!("No thread /{}/{}", board, thread_num),
                ))
            },
        };

        // dumps may carry mangled text from the scraper
        let text = sanitize::repair_utf8(&bytes);
        let dump: ThreadDump = match toml::from_str(&text) {
            Ok(dump) => dump,
            Err(err) => {
                return Err(ArchiveErr::new(
                    ErrOrigin::Database,
                    format!("Could not parse {}: {}", path.display(), err),
                ))
            },
        };

        let mut rows = dump.posts;
        for row in rows.iter_mut() {
            if row.thread_num == 0 {
                row.thread_num = thread_num;
            }
            if row.thread_num != thread_num {
                return Err(db::static_err("Post filed under the wrong thread"));
            }
            if row.num == thread_num && row.subnum == 0 {
                row.op = true;
            }
        }
        rows.sort_by_key(|row| (!row.op, row.num, row.subnum));

        Ok(rows)
    }

    fn get_post(&self, board: &str, key: PostKey) -> Result<PostRow, ArchiveErr> {
        let find = |rows: Vec<PostRow>| {
            rows.into_iter()
                .find(|row| row.num == key.num && row.subnum == key.subnum)
        };

        // cheap case: the post opens its own thread
        if !key.is_ghost() {
            if let Some(row) = self.get_thread(board, key.num).ok().and_then(find) {
                return Ok(row);
            }
        }

        for thread_num in self.thread_nums(board)? {
            if let Some(row) = find(self.get_thread(board, thread_num)?) {
                return Ok(row);
            }
        }

        Err(db::static_err("Could not find post"))
    }
}
