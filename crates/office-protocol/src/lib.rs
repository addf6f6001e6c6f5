//! Office Protocol - Wire protocol for UI clients
//!
//! This crate provides the newline-delimited JSON message types exchanged
//! between the daemon and browser-facing UI clients. Field and tag names
//! are camelCase on the wire; the client side of this protocol treats the
//! daemon as the single source of truth for session state.

pub mod message;

pub use message::{ClientCommand, ServerEvent};
