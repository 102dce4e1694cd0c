//! Client-side synchronization layer.
//!
//! Turns remote reads into keyed, cached, de-duplicated queries and remote
//! writes into mutations that invalidate the queries they can affect:
//! - [`QueryCache`]: key → entry map, one in-flight fetch per key
//! - [`Watch`]: a live subscription that (re)fetches on invalidation and
//!   optionally polls
//! - [`Mutator`]: runs writes once, serializes them per lock key, and
//!   invalidates by key prefix on success only
//!
//! Nothing here knows about reels or profiles; the key scheme and the
//! invalidation table belong to the caller.

pub mod cache;
pub mod error;
pub mod key;
pub mod logging;
pub mod mutation;
pub mod options;
pub mod watch;

pub use cache::{CacheEvent, CacheEventKind, QueryCache, QuerySnapshot, QueryStatus, Subscription};
pub use error::SyncError;
pub use key::QueryKey;
pub use logging::{NullLogger, SyncEvent, SyncLog, SyncLogger, TracingLogger};
pub use mutation::{MutationOutcome, MutationResult, MutationSpec, Mutator};
pub use options::QueryOptions;
pub use watch::Watch;
