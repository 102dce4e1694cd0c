//! Remote actor seam for the Social Connect backend.
//!
//! [`SocialActor`] is the complete operation surface the client relies on.
//! Two implementations ship here:
//! - [`HttpActor`]: JSON over `POST {base}/rpc/{method}`
//! - [`MemoryActor`]: an in-process backend for tests and offline demos
//!
//! Media goes through a separate [`BlobStore`] so upload progress never
//! touches the query cache.

pub mod blob;
pub mod error;
pub mod http;
pub mod memory;

use async_trait::async_trait;

use connect_types::{BlobHandle, Message, Principal, Reel, Story, UserProfile, UserRole};

pub use blob::{BlobStore, HttpBlobStore, UploadProgress, UploadState};
pub use error::{ActorError, ActorResult};
pub use http::HttpActor;
pub use memory::{MemoryActor, MemoryBackend, MemoryBlobStore};

/// Operations exposed by the backend, all evaluated as the caller the
/// handle was created for.
#[async_trait]
pub trait SocialActor: Send + Sync {
    async fn get_caller_user_profile(&self) -> ActorResult<Option<UserProfile>>;
    async fn get_user_profile(&self, user: &Principal) -> ActorResult<Option<UserProfile>>;
    /// Full replace, not a patch.
    async fn save_caller_user_profile(&self, profile: UserProfile) -> ActorResult<()>;

    async fn get_followers(&self, user: &Principal) -> ActorResult<Vec<Principal>>;
    async fn get_following(&self, user: &Principal) -> ActorResult<Vec<Principal>>;
    async fn follow_user(&self, target: &Principal) -> ActorResult<()>;
    async fn unfollow_user(&self, target: &Principal) -> ActorResult<()>;

    async fn get_all_reels(&self) -> ActorResult<Vec<Reel>>;
    async fn add_reel(&self, video: BlobHandle, caption: String) -> ActorResult<()>;
    async fn delete_reel(&self, reel_id: &str) -> ActorResult<()>;

    /// Includes expired stories.
    async fn get_all_stories(&self) -> ActorResult<Vec<Story>>;
    async fn add_story(&self, content: BlobHandle) -> ActorResult<()>;
    async fn delete_story(&self, story_id: &str) -> ActorResult<()>;

    async fn get_messages(&self, other_user: &Principal) -> ActorResult<Vec<Message>>;
    async fn send_message(&self, recipient: &Principal, text: String) -> ActorResult<()>;

    async fn get_caller_user_role(&self) -> ActorResult<UserRole>;
    async fn is_caller_admin(&self) -> ActorResult<bool>;
    async fn assign_caller_user_role(&self, user: &Principal, role: UserRole) -> ActorResult<()>;
}
