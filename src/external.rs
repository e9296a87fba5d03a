use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use anyhow::Result;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, execv, fork};
use std::ffi::CString;
use std::fs;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Failures while running a resolved executable, kept separate so each
/// cause is reported distinctly. An exec failure never surfaces here: it
/// aborts the child with exit code 127.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("cannot create child process: {0}")]
    Spawn(nix::Error),
    #[error("cannot collect child process status: {0}")]
    Wait(nix::Error),
}

/// Resolves typed command names to executable paths using a fixed, ordered
/// directory list supplied at construction time.
pub struct Resolver {
    dirs: Vec<PathBuf>,
}

impl Resolver {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Turn a typed command name into an executable path.
    ///
    /// Names starting with `/` or `.` are explicit paths and are returned
    /// as-is; whether they exist is discovered at launch. Anything else is
    /// searched for in the configured directories, in order, and the first
    /// entry that is a regular file with an execute bit set wins. Directories
    /// are re-walked on every call, so filesystem changes between commands
    /// are observed immediately.
    pub fn resolve(&self, command: &str) -> Option<PathBuf> {
        if command.starts_with('/') || command.starts_with('.') {
            return Some(PathBuf::from(command));
        }

        self.dirs
            .iter()
            .map(|dir| dir.join(command))
            .find(|candidate| is_executable(candidate))
    }
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Command that is not a builtin.
///
/// Holds the path the resolver produced together with the name and fields
/// the user typed; by convention the typed name, not the resolved path,
/// becomes `argv[0]` of the child.
pub struct ExternalCommand {
    typed_name: String,
    executable: PathBuf,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(typed_name: &str, executable: PathBuf, args: &[&str]) -> Self {
        Self {
            typed_name: typed_name.to_owned(),
            executable,
            args: args.iter().map(|a| (*a).to_owned()).collect(),
        }
    }
}

impl ExecutableCommand for ExternalCommand {
    /// Fork, replace the child's image with the executable, and block until
    /// the child terminates.
    ///
    /// The exec call either diverges into the new program or fails, in which
    /// case the child reports the cause on stderr and exits 127 without ever
    /// re-entering shell control flow. The parent's only job is to wait and
    /// hand the exit code back to the dispatcher; a child killed by a signal
    /// maps to `128 + signo`.
    fn execute(
        self: Box<Self>,
        _stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let path = CString::new(self.executable.as_os_str().as_bytes())?;
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(CString::new(self.typed_name.as_str())?);
        for arg in &self.args {
            argv.push(CString::new(arg.as_str())?);
        }

        match unsafe { fork() }.map_err(LaunchError::Spawn)? {
            ForkResult::Child => {
                let err = execv(&path, &argv).unwrap_err();
                eprintln!("pshell: cannot execute {}: {}", self.executable.display(), err);
                std::process::exit(127);
            }
            ForkResult::Parent { child } => {
                let status = waitpid(child, None).map_err(LaunchError::Wait)?;
                let code = match status {
                    WaitStatus::Exited(_, code) => code,
                    WaitStatus::Signaled(_, signal, _) => 128 + signal as i32,
                    _ => -1,
                };
                debug!(pid = child.as_raw(), code, "child terminated");
                Ok(code)
            }
        }
    }
}

pub(crate) struct ExternalCommandFactory {
    resolver: Resolver,
}

impl ExternalCommandFactory {
    pub(crate) fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }
}

impl CommandFactory for ExternalCommandFactory {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let executable = self.resolver.resolve(name)?;
        debug!(command = name, path = %executable.display(), "resolved external command");
        Some(Box::new(ExternalCommand::new(name, executable, args)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "pshell_external_{}_{}_{}",
            tag,
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    fn place_file(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).expect("create file");
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).expect("chmod");
        path
    }

    #[test]
    fn test_explicit_absolute_path_returned_unresolved() {
        let resolver = Resolver::new(vec![PathBuf::from("/bin")]);
        let found = resolver.resolve("/no/such/binary");
        assert_eq!(found, Some(PathBuf::from("/no/such/binary")));
    }

    #[test]
    fn test_dot_prefixed_path_bypasses_search() {
        let resolver = Resolver::new(vec![PathBuf::from("/bin")]);
        let found = resolver.resolve("./frob");
        assert_eq!(found, Some(PathBuf::from("./frob")));
    }

    #[test]
    fn test_bare_name_found_in_search_dir() {
        let dir = scratch_dir("found");
        let exe = place_file(&dir, "frob", 0o755);

        let resolver = Resolver::new(vec![dir.clone()]);
        assert_eq!(resolver.resolve("frob"), Some(exe));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_earlier_directory_shadows_later() {
        let first = scratch_dir("shadow_first");
        let second = scratch_dir("shadow_second");
        let in_first = place_file(&first, "frob", 0o755);
        let in_second = place_file(&second, "frob", 0o755);

        let resolver = Resolver::new(vec![first.clone(), second.clone()]);
        assert_eq!(resolver.resolve("frob"), Some(in_first));

        let reversed = Resolver::new(vec![second.clone(), first.clone()]);
        assert_eq!(reversed.resolve("frob"), Some(in_second));

        let _ = fs::remove_dir_all(first);
        let _ = fs::remove_dir_all(second);
    }

    #[test]
    fn test_non_executable_candidate_skipped() {
        let first = scratch_dir("noexec_first");
        let second = scratch_dir("noexec_second");
        place_file(&first, "frob", 0o644);
        let runnable = place_file(&second, "frob", 0o755);

        let resolver = Resolver::new(vec![first.clone(), second.clone()]);
        assert_eq!(resolver.resolve("frob"), Some(runnable));

        let _ = fs::remove_dir_all(first);
        let _ = fs::remove_dir_all(second);
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let dir = scratch_dir("empty");
        let resolver = Resolver::new(vec![dir.clone()]);
        assert_eq!(resolver.resolve("no_such_program"), None);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_launch_reports_child_exit_code() {
        let mut env = Environment::new();
        let mut out = Vec::new();

        let ok = Box::new(ExternalCommand::new("true", PathBuf::from("/bin/true"), &[]));
        assert_eq!(ok.execute(&mut out, &mut env).unwrap(), 0);

        let fail = Box::new(ExternalCommand::new(
            "false",
            PathBuf::from("/bin/false"),
            &[],
        ));
        assert_eq!(fail.execute(&mut out, &mut env).unwrap(), 1);
    }

    #[test]
    fn test_launch_passes_argument_vector() {
        let mut env = Environment::new();
        let mut out = Vec::new();

        let cmd = Box::new(ExternalCommand::new(
            "sh",
            PathBuf::from("/bin/sh"),
            &["-c", "exit 7"],
        ));
        assert_eq!(cmd.execute(&mut out, &mut env).unwrap(), 7);
    }

    #[test]
    fn test_launch_of_missing_explicit_path_aborts_child() {
        let mut env = Environment::new();
        let mut out = Vec::new();

        let cmd = Box::new(ExternalCommand::new(
            "ghost",
            PathBuf::from("/no/such/binary"),
            &[],
        ));
        assert_eq!(cmd.execute(&mut out, &mut env).unwrap(), 127);
    }
}
