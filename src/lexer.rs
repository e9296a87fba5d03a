//! Tokenization of input lines.
//!
//! The shell's grammar is flat: a line is a run of whitespace-separated
//! fields, the first of which names the command. There is no quoting,
//! escaping, or comment syntax.

/// One parsed input line: the command name followed by its arguments.
///
/// A `CommandLine` is only ever built from a non-blank line, so field 0
/// always exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    fields: Vec<String>,
}

impl CommandLine {
    /// Split `line` on runs of whitespace into an ordered field list.
    ///
    /// Returns `None` for a blank or whitespace-only line; the caller is
    /// expected to re-prompt without dispatching anything.
    pub fn parse(line: &str) -> Option<CommandLine> {
        let fields: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
        if fields.is_empty() {
            None
        } else {
            Some(CommandLine { fields })
        }
    }

    /// The typed command name.
    pub fn name(&self) -> &str {
        &self.fields[0]
    }

    /// The fields after the command name.
    pub fn args(&self) -> Vec<&str> {
        self.fields[1..].iter().map(String::as_str).collect()
    }
}
