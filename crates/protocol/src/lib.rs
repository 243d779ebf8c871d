//! Wire types for the pw daemon command channel.
//!
//! The daemon and its clients exchange one JSON object per file: a
//! [`Request`] written by a client and a [`Response`] written by the daemon.
//! Console events buffered by the daemon travel inside `console` responses as
//! [`ConsoleLogEntry`] values.
//!
//! Types in this crate are pure data plus request validation. They carry no
//! knowledge of files, polling, or the browser engine.

pub mod console;
pub mod request;
pub mod response;

pub use console::*;
pub use request::*;
pub use response::*;
