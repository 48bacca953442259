//! Row structs mirroring the database tables.
//!
//! Each submodule contains a `FromRow` struct matching the table and the
//! conversion into the domain type from `catalog_core`.

pub mod job;
pub mod product;
pub mod status;
pub mod webhook;
