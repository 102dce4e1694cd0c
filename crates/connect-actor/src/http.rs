use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use connect_types::api::{
    AddReelArgs, AddStoryArgs, AssignRoleArgs, MessagesArgs, NoArgs, ReelIdArgs, RpcReply,
    SaveProfileArgs, SendMessageArgs, StoryIdArgs, TargetArgs, UserArgs, method,
};
use connect_types::{BlobHandle, Message, Principal, Reel, Story, UserProfile, UserRole};

use crate::SocialActor;
use crate::error::{ActorError, ActorResult};

/// Actor reached over HTTP.
///
/// Every operation is `POST {base}/rpc/{method}` with the arguments as a JSON
/// object. The bearer token identifies the caller; no client-side timeout is
/// configured beyond reqwest's defaults.
#[derive(Clone)]
pub struct HttpActor {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpActor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<A, T>(&self, name: &str, args: &A) -> ActorResult<T>
    where
        A: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let mut req = self
            .client
            .post(format!("{}/rpc/{}", self.base_url, name))
            .json(args);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        debug!(method = name, %status, "actor call returned");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = resp.text().await.unwrap_or_default();
            return Err(ActorError::Unauthorized(format!("{} ({}): {}", name, status, body)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ActorError::Transport(format!("{} failed ({}): {}", name, status, body)));
        }

        let bytes = resp.bytes().await?;
        let reply: RpcReply<T> = serde_json::from_slice(&bytes)
            .map_err(|e| ActorError::Decode(format!("{}: {}", name, e)))?;

        match reply {
            RpcReply::Ok(value) => Ok(value),
            RpcReply::Err(fault) => Err(fault.into()),
        }
    }
}

#[async_trait]
impl SocialActor for HttpActor {
    async fn get_caller_user_profile(&self) -> ActorResult<Option<UserProfile>> {
        self.call(method::GET_CALLER_USER_PROFILE, &NoArgs::default()).await
    }

    async fn get_user_profile(&self, user: &Principal) -> ActorResult<Option<UserProfile>> {
        self.call(method::GET_USER_PROFILE, &UserArgs { user: user.clone() }).await
    }

    async fn save_caller_user_profile(&self, profile: UserProfile) -> ActorResult<()> {
        self.call(method::SAVE_CALLER_USER_PROFILE, &SaveProfileArgs { profile }).await
    }

    async fn get_followers(&self, user: &Principal) -> ActorResult<Vec<Principal>> {
        self.call(method::GET_FOLLOWERS, &UserArgs { user: user.clone() }).await
    }

    async fn get_following(&self, user: &Principal) -> ActorResult<Vec<Principal>> {
        self.call(method::GET_FOLLOWING, &UserArgs { user: user.clone() }).await
    }

    async fn follow_user(&self, target: &Principal) -> ActorResult<()> {
        self.call(method::FOLLOW_USER, &TargetArgs { target: target.clone() }).await
    }

    async fn unfollow_user(&self, target: &Principal) -> ActorResult<()> {
        self.call(method::UNFOLLOW_USER, &TargetArgs { target: target.clone() }).await
    }

    async fn get_all_reels(&self) -> ActorResult<Vec<Reel>> {
        self.call(method::GET_ALL_REELS, &NoArgs::default()).await
    }

    async fn add_reel(&self, video: BlobHandle, caption: String) -> ActorResult<()> {
        self.call(method::ADD_REEL, &AddReelArgs { video, caption }).await
    }

    async fn delete_reel(&self, reel_id: &str) -> ActorResult<()> {
        self.call(method::DELETE_REEL, &ReelIdArgs { reel_id: reel_id.to_string() }).await
    }

    async fn get_all_stories(&self) -> ActorResult<Vec<Story>> {
        self.call(method::GET_ALL_STORIES, &NoArgs::default()).await
    }

    async fn add_story(&self, content: BlobHandle) -> ActorResult<()> {
        self.call(method::ADD_STORY, &AddStoryArgs { content }).await
    }

    async fn delete_story(&self, story_id: &str) -> ActorResult<()> {
        self.call(method::DELETE_STORY, &StoryIdArgs { story_id: story_id.to_string() }).await
    }

    async fn get_messages(&self, other_user: &Principal) -> ActorResult<Vec<Message>> {
        self.call(method::GET_MESSAGES, &MessagesArgs { other_user: other_user.clone() }).await
    }

    async fn send_message(&self, recipient: &Principal, text: String) -> ActorResult<()> {
        self.call(
            method::SEND_MESSAGE,
            &SendMessageArgs { recipient: recipient.clone(), text },
        )
        .await
    }

    async fn get_caller_user_role(&self) -> ActorResult<UserRole> {
        self.call(method::GET_CALLER_USER_ROLE, &NoArgs::default()).await
    }

    async fn is_caller_admin(&self) -> ActorResult<bool> {
        self.call(method::IS_CALLER_ADMIN, &NoArgs::default()).await
    }

    async fn assign_caller_user_role(&self, user: &Principal, role: UserRole) -> ActorResult<()> {
        self.call(
            method::ASSIGN_CALLER_USER_ROLE,
            &AssignRoleArgs { user: user.clone(), role },
        )
        .await
    }
}
