//! Library entrypoint for matchday-streamer.
//!
//! Exposes all modules so integration tests can import them.

pub mod api;
pub mod chat;
pub mod config;
pub mod data;
pub mod live;
pub mod schedule;
pub mod state;
