//! Catalog jobs API server library.
//!
//! Exposes config, state, error handling, routes and the WebSocket
//! infrastructure so integration tests and the binary share them.

pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod state;
pub mod ws;
