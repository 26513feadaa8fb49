//! Causerie is a terminal-first chat client that keeps multiple
//! conversations locally and streams model replies token by token.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns runtime state: the chat store and its persistence, the
//!   configuration, and streaming orchestration.
//! - [`ui`] renders the terminal interface and runs the interactive event
//!   loop that drives user input and display updates.
//! - [`api`] defines the chat-completions payloads exchanged with the
//!   remote endpoint.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::run`], which resolves settings and hands off to
//! [`ui::chat_loop`] for the interactive session.

pub mod api;
pub mod cli;
pub mod core;
pub mod logging;
pub mod ui;
pub mod utils;
