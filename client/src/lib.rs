//! # Awalé Client Library
//!
//! Interactive text client for the Awalé server. The client is a thin
//! translator: it parses commands from stdin into protocol messages and
//! pretty-prints whatever the server sends back. All rules and state live
//! on the server.
//!
//! - [`commands`] — the command grammar and its mapping to messages.
//! - [`network`] — connection setup and the stdin/server `select!` loop.

pub mod commands;
pub mod network;
