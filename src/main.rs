use chanarchive::config::Config;
use chanarchive::console;
use chanarchive::fsdb::FSSource;
use chanarchive::render::{RenderOptions, Renderer};
use chanarchive::site::Permissions;
use clap::Parser;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(about = concat!(env!("CARGO_CRATE_NAME"), " - render archived imageboard threads"))]
struct Flags {
    /// TOML configuration file
    #[arg(short, long, default_value = "chanarchive.toml")]
    config: PathBuf,

    /// Directory holding `<board>/<thread>.toml` dumps
    #[arg(short, long, default_value = "./archive")]
    root: PathBuf,

    /// Link unknown references into the current thread
    #[arg(long)]
    realtime: bool,

    /// Bare `#num` links for posts in the same batch
    #[arg(long)]
    hash_only: bool,

    /// Thread view used in links
    #[arg(long, default_value = "thread")]
    method: String,

    /// Permission granted to the viewer, e.g. `comment.see_ip`; repeatable
    #[arg(long = "grant")]
    grants: Vec<String>,

    /// boards | thread <board> <num> | post <board> <num> | backlinks <board> <thread> <post>
    #[arg(required = true, num_args = 1..)]
    command: Vec<String>,
}

fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let flags = Flags::parse();

    let config = match Config::from_file(&flags.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        },
    };

    let options = RenderOptions {
        realtime: flags.realtime,
        backlinks_hash_only_url: flags.hash_only,
        controller_method: flags.method.clone(),
        ..RenderOptions::default()
    };

    let renderer = match Renderer::new(config) {
        Ok(renderer) => renderer.with_options(options),
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        },
    };

    let source = match FSSource::from_root(&flags.root) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        },
    };

    let grants = flags.grants.iter().map(|g| g.as_str()).collect::<Vec<&str>>();
    let access = Permissions::new(&grants);

    log::debug!("Running {:?}", flags.command);
    print!("{}", console::execute(&renderer, &source, &access, &flags.command.join(" ")));
}
