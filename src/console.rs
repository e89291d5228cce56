use crate::db::PostSource;
use crate::index::PostKey;
use crate::render::{Renderer, ThreadView};
use crate::site::Access;
use crate::util::ArchiveErr;

fn load_thread<S: PostSource>(
    renderer: &Renderer,
    source: &S,
    access: &dyn Access,
    board: &str,
    thread_num: u64,
) -> Result<ThreadView, ArchiveErr> {
    let rows = source.get_thread(board, thread_num)?;
    renderer.render_thread(board, rows, access)
}

fn show_thread(view: &ThreadView) -> String {
    let mut outbuf = String::new();
    for post in view.op.iter().chain(view.posts.values()) {
        if let Some(formatted) = &post.formatted {
            outbuf += formatted;
            outbuf.push('\n');
        }
    }
    outbuf
}

/// Run one console command against the archive and return its output.
pub fn execute<S: PostSource>(
    renderer: &Renderer,
    source: &S,
    access: &dyn Access,
    command: &str,
) -> String {
    let parts = command.split_whitespace().collect::<Vec<&str>>();
    if parts.is_empty() {
        return String::from("");
    }

    match parts[0] {
        "boards" => {
            let stored = source.boards().unwrap_or_else(|_| vec![]);
            let mut outbuf = String::new();

            for board in renderer.config().boards.iter() {
                outbuf += &format!(
                    "/{}/ - {}{}{}\n",
                    board.shortname,
                    board.name,
                    if board.archive { " - archive" } else { "" },
                    if stored.contains(&board.shortname) { "" } else { " - no threads" },
                );
            }

            outbuf
        },

        "thread" => {
            if parts.len() < 3 {
                return String::from("thread <board> <thread_num>\n");
            }

            let thread_num = match parts[2].parse::<u64>() {
                Ok(num) => num,
                Err(_) => {
                    return String::from("Thread num did not parse\n");
                },
            };

            match load_thread(renderer, source, access, parts[1], thread_num) {
                Ok(view) => show_thread(&view),
                Err(err) => format!("Error: {}\n", err),
            }
        },

        "post" => {
            if parts.len() < 3 {
                return String::from("post <board> <post_num>\n");
            }

            let key = match PostKey::parse(parts[2]) {
                Some(key) => key,
                None => {
                    return String::from("Post num did not parse\n");
                },
            };

            let row = match source.get_post(parts[1], key) {
                Ok(row) => row,
                Err(err) => return format!("Error: {}\n", err),
            };

            // render the whole thread so the post's backlinks are complete
            match load_thread(renderer, source, access, parts[1], row.thread_num) {
                Ok(view) => {
                    let post = match &view.op {
                        Some(op) if op.key == key => Some(op),
                        _ => view.posts.get(&key.to_string()),
                    };
                    match post.and_then(|post| post.formatted.clone()) {
                        Some(formatted) => formatted + "\n",
                        None => String::from("Post not found in its thread\n"),
                    }
                },
                Err(err) => format!("Error: {}\n", err),
            }
        },

        "backlinks" => {
            if parts.len() < 4 {
                return String::from("backlinks <board> <thread_num> <post_num>\n");
            }

            let (thread_num, key) = match (parts[2].parse::<u64>(), PostKey::parse(parts[3])) {
                (Ok(thread_num), Some(key)) => (thread_num, key),
                _ => {
                    return String::from("Post num did not parse\n");
                },
            };

            match load_thread(renderer, source, access, parts[1], thread_num) {
                Ok(view) => {
                    let backlinks = match &view.op {
                        Some(op) if op.key == key => Some(&op.backlinks),
                        _ => view.posts.get(&key.to_string()).map(|post| &post.backlinks),
                    };
                    match backlinks {
                        Some(backlinks) => backlinks.iter().map(|b| format!("{}\n", b)).collect(),
                        None => String::from("Post not found in thread\n"),
                    }
                },
                Err(err) => format!("Error: {}\n", err),
            }
        },

        _ => String::from("?\n"),
    }
}
