//! Frame-level WebSocket implementation for the Tokio stack.
//!
//! This library is the protocol engine described by
//! [RFC 6455](https://datatracker.ietf.org/doc/html/rfc6455): it rides on
//! top of an already-established byte duplex (typically a TCP stream after
//! the HTTP upgrade handshake, which is out of scope here) and takes care
//! of everything frame-level from there. Inbound bytes become frames and
//! reassembled messages, outbound messages become masked or unmasked
//! frames, and the engine enforces the framing rules, the fragmentation
//! rules, the masking direction of each role, and the closing handshake.
//!
//! Hand [`connection::attach`] anything implementing `AsyncRead` +
//! `AsyncWrite` together with a role and a policy, and it returns the two
//! application-facing halves: a clonable [`split::WsSender`] whose
//! `send_*` operations each yield a completion handle, and an
//! [`event::EventStream`] delivering whole messages, control frames and
//! the connection's lifecycle tail.

pub mod aggregator;
pub mod close;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod frame;
pub mod generator;
pub mod handle;
pub mod mask;
pub mod message;
pub mod parser;
pub mod registry;
pub mod split;
pub mod state;

mod pipeline;
mod read;
mod write;
