//! # Awalé Game Server Library
//!
//! Authoritative server for networked Awalé (Oware) matches. It owns the
//! player registry, the persistent account store, every running game
//! session, and the board rules themselves; clients are thin translators
//! between user commands and protocol messages.
//!
//! ## Architecture
//!
//! All mutable state lives on a single dispatch loop. The TCP accept loop
//! and one reader task per connection feed events into an `mpsc` channel;
//! the loop consumes them sequentially, so every handler observes the
//! registry, the account store and the session table atomically and no
//! game ever sees two moves in flight. Outbound messages are queued on a
//! per-connection channel drained by a dedicated writer task, which keeps
//! a slow client from stalling anyone else.
//!
//! ## Module Organization
//!
//! - [`game`] — the Awalé rules: sowing, captures, starvation sweep,
//!   give-up scoring, and a textual board renderer.
//! - [`accounts`] — the flat-file account store: names, secrets, bios and
//!   the symmetric friend graph, rewritten on every mutation.
//! - [`registry`] — connected players, their outbound channels, and the
//!   bounded pending challenge/friend-request lists.
//! - [`session`] — running matches: move application, observers, session
//!   chat, and the JSON record written when a match ends.
//! - [`network`] — the TCP listener, connection tasks and the dispatch
//!   loop routing every protocol message.

pub mod accounts;
pub mod game;
pub mod network;
pub mod registry;
pub mod session;
pub mod util;
