//! Client-side synchronization layer for server-computed fraud-analytics
//! metrics.
//!
//! Two independent channels keep the local view consistent: periodic pull
//! (the polling cache in [`cache`], driven by the authenticated [`client`])
//! and asynchronous push (the WebSocket subscriber in [`push`]). Both merge
//! into one authoritative cached state, with every inbound payload routed
//! through [`normalize`] first. [`context::SyncContext`] wires the pieces
//! together and enforces which feeds are authorization-gated.

pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod logging;
pub mod metadata;
pub mod model;
pub mod normalize;
pub mod push;
pub mod session;
