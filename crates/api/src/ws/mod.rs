//! WebSocket infrastructure for live job progress.
//!
//! Provides connection management, heartbeat pings and the per-job
//! upgrade handler.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::{job_progress_ws, progress_message};
pub use heartbeat::Heartbeat;
pub use manager::WsManager;
