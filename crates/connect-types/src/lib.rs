//! Shared data model for the Social Connect client.
//!
//! Everything here mirrors what the remote actor hands back. The client only
//! ever holds transient copies of these records.

pub mod api;
pub mod blob;
pub mod events;
pub mod models;

pub use blob::BlobHandle;
pub use models::{Message, Principal, Reel, Story, UserProfile, UserRole};
