//! Shared building blocks used by every pipeline

pub mod channels;
pub mod errors;
pub mod retry;
pub mod traits;
pub mod types;
