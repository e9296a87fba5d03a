use crate::command::{CommandFactory, ExitCode};
use crate::env::Environment;
use crate::lexer::CommandLine;
use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Failures of dispatch itself, as opposed to failures of a command.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The typed name is no builtin and the search path has no match.
    #[error("Executable file {0} not found")]
    ExecutableNotFound(String),
}

/// Factory allows creating instances of ExecutableCommand.
///
/// One `Factory<T>` per builtin; the external launcher has its own stateful
/// factory holding the resolver.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// The shell's dispatch loop: built-in commands plus external program launch.
///
/// The interpreter maintains an [`Environment`] and an ordered list of
/// [`CommandFactory`] objects that are queried to create commands by name;
/// the first factory that recognizes a name wins, so builtins shadow
/// external programs. See [`Default`] for the stock configuration.
///
/// Example
/// ```
/// use pshell::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.run("where", &[]).unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            commands,
        }
    }

    /// Create an interpreter with the stock builtins and an external
    /// launcher resolving against `dirs`.
    pub fn with_search_path(dirs: Vec<PathBuf>) -> Self {
        use crate::builtin::{Copy, Delete, Down, Exit, Files, Info, Up, Where};
        use crate::external::{ExternalCommandFactory, Resolver};
        Self::new(vec![
            Box::new(Factory::<Files>::default()),
            Box::new(Factory::<Info>::default()),
            Box::new(Factory::<Delete>::default()),
            Box::new(Factory::<Copy>::default()),
            Box::new(Factory::<Where>::default()),
            Box::new(Factory::<Down>::default()),
            Box::new(Factory::<Up>::default()),
            Box::new(Factory::<Exit>::default()),
            Box::new(ExternalCommandFactory::new(Resolver::new(dirs))),
        ])
    }

    /// Run a single command invocation by name with arguments.
    ///
    /// Returns the command's exit code, or an error when the name matches no
    /// builtin and resolves to no executable, or when launching one fails.
    pub fn run(&mut self, name: &str, args: &[&str]) -> Result<ExitCode> {
        self.run_with_output(name, args, &mut std::io::stdout())
    }

    /// Like [`run`](Self::run), writing builtin output to `stdout` instead of
    /// the real standard output.
    pub fn run_with_output(
        &mut self,
        name: &str,
        args: &[&str],
        stdout: &mut dyn Write,
    ) -> Result<ExitCode> {
        debug!(command = name, "dispatching");
        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(&self.env, name, args) {
                return cmd.execute(stdout, &mut self.env);
            }
        }
        Err(DispatchError::ExecutableNotFound(name.to_owned()).into())
    }

    /// The Read-Eval-Print Loop.
    ///
    /// One command per line; a blank line re-prompts without dispatching.
    /// The loop survives every command failure and ends on `exit` or
    /// end-of-input.
    pub fn repl(&mut self) -> rustyline::Result<()> {
        let mut rl = DefaultEditor::new()?;

        while !self.env.should_exit {
            match rl.readline("pshell> ") {
                Ok(line) => {
                    let Some(cmd) = CommandLine::parse(&line) else {
                        continue;
                    };
                    rl.add_history_entry(line.as_str())?;

                    let args = cmd.args();
                    match self.run(cmd.name(), &args) {
                        Ok(code) => {
                            if code != 0 {
                                debug!(command = cmd.name(), code, "command failed");
                            }
                        }
                        Err(err) => println!("{}", err),
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    println!("exit");
                    break;
                }
                Err(err) => {
                    eprintln!("pshell: readline error: {}", err);
                    break;
                }
            }
        }

        Ok(())
    }
}

impl Default for Interpreter {
    /// Stock shell: the eight builtins, then the external launcher using the
    /// startup search path (`PSHELL_PATH` or the built-in default).
    fn default() -> Self {
        Self::with_search_path(crate::env::startup_search_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::fs::File;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "pshell_interp_{}_{}_{}",
            tag,
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn test_unknown_command_is_a_resolution_failure() {
        let dir = scratch_dir("unknown");
        let mut sh = Interpreter::with_search_path(vec![dir.clone()]);

        let mut out = Vec::new();
        let err = sh
            .run_with_output("unknownprog", &[], &mut out)
            .unwrap_err();
        assert_eq!(err.to_string(), "Executable file unknownprog not found");
        assert!(out.is_empty());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_builtin_shadows_external_program() {
        let dir = scratch_dir("shadow");
        let fake = dir.join("where");
        File::create(&fake).unwrap();
        fs::set_permissions(&fake, fs::Permissions::from_mode(0o755)).unwrap();

        let mut sh = Interpreter::with_search_path(vec![dir.clone()]);
        let mut out = Vec::new();
        let code = sh.run_with_output("where", &[], &mut out).unwrap();

        assert_eq!(code, 0);
        // builtin output, not a forked child writing to the real stdout
        assert_eq!(
            String::from_utf8(out).unwrap().trim_end(),
            sh.env.current_dir.to_string_lossy()
        );

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_arg_count_checked_through_dispatch() {
        let mut sh = Interpreter::with_search_path(vec![]);
        let mut out = Vec::new();
        let code = sh.run_with_output("copy", &["only_src"], &mut out).unwrap();

        assert_eq!(code, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Missing argument for command copy\n"
        );
    }

    #[test]
    fn test_external_command_exit_codes_surface() {
        let dirs = vec![PathBuf::from("/bin"), PathBuf::from("/usr/bin")];
        let mut sh = Interpreter::with_search_path(dirs);
        let mut out = Vec::new();

        assert_eq!(sh.run_with_output("true", &[], &mut out).unwrap(), 0);
        assert_eq!(sh.run_with_output("false", &[], &mut out).unwrap(), 1);
    }

    #[test]
    fn test_exit_flags_loop_termination() {
        let mut sh = Interpreter::with_search_path(vec![]);
        let mut out = Vec::new();
        let code = sh.run_with_output("exit", &[], &mut out).unwrap();

        assert_eq!(code, 0);
        assert_eq!(String::from_utf8(out).unwrap(), "Goodbye.\n");
        assert!(sh.env.should_exit);
    }
}
