//! Database models and queries

pub mod images;
pub mod init;
pub mod judgments;
pub mod models;
pub mod sessions;

pub use init::*;
pub use models::*;
