use serde::{Deserialize, Serialize};

use crate::blob::BlobHandle;
use crate::models::{Principal, UserProfile, UserRole};

/// Wire names of the actor methods.
pub mod method {
    pub const GET_CALLER_USER_PROFILE: &str = "getCallerUserProfile";
    pub const GET_USER_PROFILE: &str = "getUserProfile";
    pub const SAVE_CALLER_USER_PROFILE: &str = "saveCallerUserProfile";
    pub const GET_FOLLOWERS: &str = "getFollowers";
    pub const GET_FOLLOWING: &str = "getFollowing";
    pub const FOLLOW_USER: &str = "followUser";
    pub const UNFOLLOW_USER: &str = "unfollowUser";
    pub const GET_ALL_REELS: &str = "getAllReels";
    pub const ADD_REEL: &str = "addReel";
    pub const DELETE_REEL: &str = "deleteReel";
    pub const GET_ALL_STORIES: &str = "getAllStories";
    pub const ADD_STORY: &str = "addStory";
    pub const DELETE_STORY: &str = "deleteStory";
    pub const GET_MESSAGES: &str = "getMessages";
    pub const SEND_MESSAGE: &str = "sendMessage";
    pub const GET_CALLER_USER_ROLE: &str = "getCallerUserRole";
    pub const IS_CALLER_ADMIN: &str = "isCallerAdmin";
    pub const ASSIGN_CALLER_USER_ROLE: &str = "assignCallerUserRole";
}

// -- Envelope --

/// Reply body for every `POST /rpc/{method}` call.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcReply<T> {
    Ok(T),
    Err(RpcFault),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcFault {
    pub kind: FaultKind,
    pub message: String,
}

/// Failure classes the backend reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Unauthorized,
    Rejected,
    Internal,
}

// -- Arguments --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserArgs {
    pub user: Principal,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetArgs {
    pub target: Principal,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveProfileArgs {
    pub profile: UserProfile,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddReelArgs {
    pub video: BlobHandle,
    pub caption: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddStoryArgs {
    pub content: BlobHandle,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ReelIdArgs {
    pub reel_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct StoryIdArgs {
    pub story_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MessagesArgs {
    pub other_user: Principal,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageArgs {
    pub recipient: Principal,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignRoleArgs {
    pub user: Principal,
    pub role: UserRole,
}

/// Calls that take no arguments still send `{}`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NoArgs {}

// -- Blobs --

#[derive(Debug, Serialize, Deserialize)]
pub struct BlobUploadResponse {
    pub url: String,
}
