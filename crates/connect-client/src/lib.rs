//! Social Connect client.
//!
//! [`SocialClient`] binds the sync layer to the backend: one cached read
//! (and one live [`Watch`](connect_sync::Watch)) per actor query, one
//! mutation per actor write, each declaring what it invalidates in
//! [`keys`]. Writes are validated locally before anything is sent.

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod keys;
pub mod mutations;
pub mod queries;
pub mod session;
pub mod upload;
pub mod validation;
pub mod views;

pub use client::{ClientBuilder, SocialClient};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SyncSettings;
pub use error::{ClientError, ClientResult};
pub use mutations::DEFAULT_AVATAR;
pub use session::{Identity, Session};
pub use upload::ProgressFn;
pub use validation::{Media, MediaKind, ProfileDraft, ValidationError};
pub use views::StoryGroups;
