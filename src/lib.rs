//! A small interactive file shell.
//!
//! This crate provides the building blocks of a line-oriented command shell:
//! a handful of built-in filesystem commands (list, inspect, delete, copy,
//! navigate) and a launcher that locates external programs on a fixed search
//! path and runs them as foreground child processes. It is intentionally
//! small and easy to read.
//!
//! The main entry point is [`Interpreter`], which dispatches commands by name
//! through a set of pluggable factories. The public modules [`command`] and
//! [`env`] expose the traits and state types needed to implement additional
//! commands or to embed the dispatcher without the interactive loop.

mod builtin;
pub mod command;
pub mod env;
mod external;
mod interpreter;
mod lexer;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
