//! Officed - Pixel-office daemon library
//!
//! The daemon tracks external CLI agent sessions through their on-disk
//! transcript files, derives UI-visible status with debounced timers,
//! bridges interactive terminals, and relays everything to UI clients
//! over a Unix socket.

pub mod adopt;
pub mod manager;
pub mod server;
pub mod tailer;
pub mod timer;
