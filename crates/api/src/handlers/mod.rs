pub mod imports;
pub mod jobs;
pub mod products;
pub mod webhooks;
