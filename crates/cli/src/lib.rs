//! `pw`: a browser session daemon driven through files.
//!
//! A long-lived [`daemon::Daemon`] owns one browser session and polls a
//! directory for requests written by short-lived [`client::DaemonClient`]
//! invocations. See [`channel`] for the file protocol and [`session`] for how
//! a lost browser is replaced.

pub mod browser;
pub mod channel;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod console;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod output;
pub mod session;
pub mod testing;
