use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::{Context, Result};
use nix::unistd::{Uid, User};
use std::env as stdenv;
use std::fs;
use std::io::Write;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use thiserror::Error;

/// Failures a builtin can report. Each is recovered by the dispatch loop;
/// none leaves a partial filesystem change behind.
#[derive(Debug, Error)]
pub enum BuiltinError {
    #[error("Missing argument for command {command}")]
    MissingArgument { command: &'static str },
    #[error("Unexpected argument {argument} for command {command}")]
    UnexpectedArgument {
        command: &'static str,
        argument: String,
    },
    #[error("{command}: {path}: not found")]
    NotFound {
        command: &'static str,
        path: String,
    },
    #[error("copy: source does not exist or destination already exists")]
    CopyPrecondition,
    #[error("up: cannot go above the filesystem root")]
    AtFilesystemRoot,
}

/// Built-in commands known to the shell at compile time.
///
/// Builtins declare how many arguments they require; the factory enforces
/// that count before `build` is ever called, so a handler only runs with
/// exactly the fields it expects.
pub(crate) trait BuiltinCommand: Sized {
    /// Canonical name of the command, e.g. "files" or "copy".
    fn name() -> &'static str;

    /// Exact number of arguments the command takes.
    fn arity() -> usize;

    /// Construct the command from exactly [`arity`](Self::arity) arguments.
    fn build(args: &[&str]) -> Self;

    /// Executes the command using the provided output stream and environment.
    ///
    /// Return value follows shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        match T::execute(*self, stdout, env) {
            Ok(code) => Ok(code),
            Err(e) => {
                writeln!(stdout, "{}", e)?;
                Ok(1)
            }
        }
    }
}

/// Command standing in for a builtin whose argument count was wrong.
///
/// Printing the diagnostic is its only effect, which guarantees a rejected
/// invocation touches nothing on disk.
struct InvalidArgs {
    message: String,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.message)?;
        Ok(1)
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name != T::name() {
            return None;
        }

        let arity = T::arity();
        if args.len() < arity {
            return Some(Box::new(InvalidArgs {
                message: BuiltinError::MissingArgument { command: T::name() }.to_string(),
            }));
        }
        if args.len() > arity {
            return Some(Box::new(InvalidArgs {
                message: BuiltinError::UnexpectedArgument {
                    command: T::name(),
                    argument: args[arity].to_owned(),
                }
                .to_string(),
            }));
        }

        Some(Box::new(T::build(args)))
    }
}

/// List the current directory, tagging every entry as `dir` or `file`.
pub struct Files;

impl BuiltinCommand for Files {
    fn name() -> &'static str {
        "files"
    }

    fn arity() -> usize {
        0
    }

    fn build(_args: &[&str]) -> Self {
        Files
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let entries = fs::read_dir(&env.current_dir)
            .with_context(|| format!("files: cannot read {}", env.current_dir.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| "files: cannot read directory entry")?;
            // classification follows symlinks, like stat
            let is_dir = fs::metadata(entry.path())
                .map(|m| m.is_dir())
                .unwrap_or(false);
            let tag = if is_dir { "dir" } else { "file" };
            writeln!(stdout, "{}: {}", tag, entry.file_name().to_string_lossy())?;
        }
        Ok(0)
    }
}

/// Print ownership, type, size and timestamp details for one path.
pub struct Info {
    path: String,
}

impl BuiltinCommand for Info {
    fn name() -> &'static str {
        "info"
    }

    fn arity() -> usize {
        1
    }

    fn build(args: &[&str]) -> Self {
        Info {
            path: args[0].to_owned(),
        }
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let path = env.resolve_path(&self.path);
        let meta = fs::metadata(&path).map_err(|_| BuiltinError::NotFound {
            command: "info",
            path: self.path.clone(),
        })?;

        writeln!(stdout, "name: {}", self.path)?;
        writeln!(stdout, "owner: {}", owner_name(meta.uid()))?;
        if meta.is_dir() {
            writeln!(stdout, "type: dir")?;
        } else {
            writeln!(stdout, "type: file")?;
            writeln!(stdout, "size (bytes): {}", meta.len())?;
            writeln!(stdout, "last access: {}", format_timestamp(meta.atime()))?;
            writeln!(
                stdout,
                "last permission change: {}",
                format_timestamp(meta.ctime())
            )?;
        }
        writeln!(stdout, "last modified: {}", format_timestamp(meta.mtime()))?;
        writeln!(
            stdout,
            "executable: {}",
            meta.permissions().mode() & 0o111 != 0
        )?;
        Ok(0)
    }
}

fn owner_name(uid: u32) -> String {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

fn format_timestamp(secs: i64) -> String {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    let t = secs as libc::time_t;
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    if unsafe { libc::localtime_r(&t, &mut tm) }.is_null() {
        return secs.to_string();
    }
    let month = MONTHS.get(tm.tm_mon as usize).copied().unwrap_or("???");
    format!(
        "{} {:02} {} {:02}:{:02}:{:02}",
        month,
        tm.tm_mday,
        1900 + tm.tm_year,
        tm.tm_hour,
        tm.tm_min,
        tm.tm_sec
    )
}

/// Remove one file, refusing up front when it does not exist.
pub struct Delete {
    path: String,
}

impl BuiltinCommand for Delete {
    fn name() -> &'static str {
        "delete"
    }

    fn arity() -> usize {
        1
    }

    fn build(args: &[&str]) -> Self {
        Delete {
            path: args[0].to_owned(),
        }
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let path = env.resolve_path(&self.path);
        if !path.exists() {
            return Err(BuiltinError::NotFound {
                command: "delete",
                path: self.path.clone(),
            }
            .into());
        }
        fs::remove_file(&path).with_context(|| format!("delete: cannot remove {}", self.path))?;
        writeln!(stdout, "removed {}", self.path)?;
        Ok(0)
    }
}

/// Duplicate a file's bytes into a destination that must not exist yet.
pub struct Copy {
    src: String,
    dst: String,
}

impl BuiltinCommand for Copy {
    fn name() -> &'static str {
        "copy"
    }

    fn arity() -> usize {
        2
    }

    fn build(args: &[&str]) -> Self {
        Copy {
            src: args[0].to_owned(),
            dst: args[1].to_owned(),
        }
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let src = env.resolve_path(&self.src);
        let dst = env.resolve_path(&self.dst);
        if !src.exists() || dst.exists() {
            return Err(BuiltinError::CopyPrecondition.into());
        }
        if let Err(err) = fs::copy(&src, &dst) {
            // failure leaves no half-written destination behind
            let _ = fs::remove_file(&dst);
            return Err(anyhow::anyhow!(
                "copy: cannot copy {} to {}: {}",
                self.src,
                self.dst,
                err
            ));
        }
        writeln!(stdout, "copied {} -> {}", self.src, self.dst)?;
        Ok(0)
    }
}

/// Print the current working directory to the output stream.
pub struct Where;

impl BuiltinCommand for Where {
    fn name() -> &'static str {
        "where"
    }

    fn arity() -> usize {
        0
    }

    fn build(_args: &[&str]) -> Self {
        Where
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

/// Descend into a subdirectory of the current working directory.
pub struct Down {
    subdir: String,
}

impl BuiltinCommand for Down {
    fn name() -> &'static str {
        "down"
    }

    fn arity() -> usize {
        1
    }

    fn build(args: &[&str]) -> Self {
        Down {
            subdir: args[0].to_owned(),
        }
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let target = env.current_dir.join(&self.subdir);
        let meta = fs::metadata(&target).map_err(|_| BuiltinError::NotFound {
            command: "down",
            path: self.subdir.clone(),
        })?;
        if !meta.is_dir() {
            return Err(anyhow::anyhow!("down: {}: not a directory", self.subdir));
        }

        let canonical = fs::canonicalize(&target)
            .with_context(|| format!("down: cannot resolve {}", self.subdir))?;
        stdenv::set_current_dir(&canonical)
            .with_context(|| format!("down: cannot change to {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

/// Move the working directory up to its parent.
pub struct Up;

impl BuiltinCommand for Up {
    fn name() -> &'static str {
        "up"
    }

    fn arity() -> usize {
        0
    }

    fn build(_args: &[&str]) -> Self {
        Up
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let parent = match env.current_dir.parent() {
            Some(parent) => parent.to_path_buf(),
            None => return Err(BuiltinError::AtFilesystemRoot.into()),
        };
        stdenv::set_current_dir(&parent)
            .with_context(|| format!("up: cannot change to {}", parent.display()))?;
        env.current_dir = parent;
        Ok(0)
    }
}

/// Say goodbye and flag the loop to terminate.
pub struct Exit;

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn arity() -> usize {
        0
    }

    fn build(_args: &[&str]) -> Self {
        Exit
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "Goodbye.")?;
        env.should_exit = true;
        Ok(0)
    }
}
