//! WebSocket HTTP handler for the web layer.
//!
//! This module contains only the upgrade entry point. The hub, connection
//! adapter and message types live in the `ws` crate.

pub mod handler;
