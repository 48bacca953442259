//! Repository layer: one zero-sized struct per table.

pub mod job_repo;
pub mod product_repo;
pub mod webhook_repo;

pub use job_repo::JobRepo;
pub use product_repo::ProductRepo;
pub use webhook_repo::WebhookRepo;
