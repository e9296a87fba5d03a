use argh::FromArgs;
use pshell::Interpreter;
use pshell::env;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(FromArgs)]
/// Interactive file shell: built-in filesystem commands plus external
/// programs found on a fixed search path.
struct Options {
    /// colon-separated directories searched for external commands; overrides
    /// the PSHELL_PATH environment variable and the built-in default
    /// (/bin:/usr/bin:/usr/local/bin:.)
    #[argh(option)]
    search_path: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let options: Options = argh::from_env();
    let dirs: Vec<PathBuf> = match &options.search_path {
        Some(paths) => std::env::split_paths(paths).collect(),
        None => env::startup_search_path(),
    };

    let mut shell = Interpreter::with_search_path(dirs);
    shell.repl()?;
    Ok(())
}
