//! Outbound delivery transports.

pub mod webhook;
