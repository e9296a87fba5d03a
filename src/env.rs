use std::env as stdenv;
use std::path::PathBuf;

/// Directories searched for external commands when nothing overrides them,
/// in resolution order. Earlier entries shadow later ones.
///
/// The list is fixed when the shell starts; it is not re-read between
/// commands. Set `PSHELL_PATH` (colon-separated) or pass `--search-path`
/// to use a different list.
pub const DEFAULT_SEARCH_PATH: &[&str] = &["/bin", "/usr/bin", "/usr/local/bin", "."];

/// Mutable, user-level view of the process state used by the interpreter.
///
/// The environment contains:
/// - `current_dir`: the working directory all relative paths resolve against.
/// - `should_exit`: a flag the REPL loop checks to know when to terminate.
///
/// `current_dir` is kept in sync with the real process working directory so
/// that spawned children and `.`-relative command resolution observe it.
#[derive(Debug, Clone)]
pub struct Environment {
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// When set to true, indicates that the interactive loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            current_dir,
            should_exit: false,
        }
    }

    /// Resolve a user-supplied path against the current working directory.
    ///
    /// Absolute paths are returned unchanged.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            path
        } else {
            self.current_dir.join(path)
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// The search path the shell starts with: `PSHELL_PATH` when set, the
/// built-in [`DEFAULT_SEARCH_PATH`] otherwise.
pub fn startup_search_path() -> Vec<PathBuf> {
    match stdenv::var_os("PSHELL_PATH") {
        Some(paths) => stdenv::split_paths(&paths).collect(),
        None => DEFAULT_SEARCH_PATH.iter().map(PathBuf::from).collect(),
    }
}
