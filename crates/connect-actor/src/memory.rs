use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use connect_types::api::method;
use connect_types::{BlobHandle, Message, Principal, Reel, Story, UserProfile, UserRole};

use crate::SocialActor;
use crate::blob::{BlobStore, UploadProgress, slices};
use crate::error::{ActorError, ActorResult};

/// How long a story stays visible after posting.
pub const STORY_TTL_HOURS: i64 = 24;

#[derive(Default)]
struct MemoryState {
    profiles: HashMap<Principal, UserProfile>,
    /// (follower, followee)
    follows: BTreeSet<(Principal, Principal)>,
    reels: Vec<Reel>,
    stories: Vec<Story>,
    messages: Vec<Message>,
    roles: HashMap<Principal, UserRole>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, VecDeque<ActorError>>,
    latency: Duration,
}

/// In-process stand-in for the remote backend.
///
/// State is shared by every [`MemoryActor`] handed out by
/// [`actor_for`](Self::actor_for). Calls are counted per method and can be
/// delayed or made to fail, which is what the sync layer tests lean on.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that performs every call as `caller`.
    pub fn actor_for(&self, caller: Principal) -> MemoryActor {
        MemoryActor {
            backend: self.clone(),
            caller,
        }
    }

    /// Delay applied to every call after it is counted.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Make the next call to `name` fail with `err`.
    pub fn fail_next(&self, name: &'static str, err: ActorError) {
        self.state.lock().failures.entry(name).or_default().push_back(err);
    }

    pub fn calls(&self, name: &str) -> usize {
        self.state.lock().calls.get(name).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    pub fn insert_profile(&self, who: Principal, profile: UserProfile) {
        self.state.lock().profiles.insert(who, profile);
    }

    pub fn insert_reel(&self, reel: Reel) {
        self.state.lock().reels.push(reel);
    }

    pub fn insert_story(&self, story: Story) {
        self.state.lock().stories.push(story);
    }

    pub fn insert_message(&self, message: Message) {
        self.state.lock().messages.push(message);
    }

    pub fn insert_follow(&self, follower: Principal, followee: Principal) {
        self.state.lock().follows.insert((follower, followee));
    }

    pub fn set_role(&self, who: Principal, role: UserRole) {
        self.state.lock().roles.insert(who, role);
    }

    fn with_state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut MemoryState) -> T,
    {
        let mut state = self.state.lock();
        f(&mut state)
    }

    /// Counts the call, waits out the configured latency, then pops any
    /// injected failure.
    async fn enter(&self, name: &'static str) -> ActorResult<()> {
        let latency = self.with_state(|s| {
            *s.calls.entry(name).or_default() += 1;
            s.latency
        });
        debug!(method = name, "memory actor call");

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match self.with_state(|s| s.failures.get_mut(name).and_then(VecDeque::pop_front)) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn profile_with_counts(state: &MemoryState, who: &Principal) -> Option<UserProfile> {
    state.profiles.get(who).map(|p| {
        let mut profile = p.clone();
        profile.follower_count = state.follows.iter().filter(|(_, f)| f == who).count() as u64;
        profile.following_count = state.follows.iter().filter(|(f, _)| f == who).count() as u64;
        profile
    })
}

/// One caller's view of a [`MemoryBackend`].
#[derive(Clone)]
pub struct MemoryActor {
    backend: MemoryBackend,
    caller: Principal,
}

impl MemoryActor {
    pub fn caller(&self) -> &Principal {
        &self.caller
    }

    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }

    fn require_user(&self) -> ActorResult<()> {
        if self.caller.is_anonymous() {
            return Err(ActorError::Unauthorized("anonymous caller".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SocialActor for MemoryActor {
    async fn get_caller_user_profile(&self) -> ActorResult<Option<UserProfile>> {
        self.backend.enter(method::GET_CALLER_USER_PROFILE).await?;
        Ok(self.backend.with_state(|s| profile_with_counts(s, &self.caller)))
    }

    async fn get_user_profile(&self, user: &Principal) -> ActorResult<Option<UserProfile>> {
        self.backend.enter(method::GET_USER_PROFILE).await?;
        Ok(self.backend.with_state(|s| profile_with_counts(s, user)))
    }

    async fn save_caller_user_profile(&self, profile: UserProfile) -> ActorResult<()> {
        self.backend.enter(method::SAVE_CALLER_USER_PROFILE).await?;
        self.require_user()?;
        self.backend.with_state(|s| {
            s.profiles.insert(self.caller.clone(), profile);
        });
        Ok(())
    }

    async fn get_followers(&self, user: &Principal) -> ActorResult<Vec<Principal>> {
        self.backend.enter(method::GET_FOLLOWERS).await?;
        Ok(self.backend.with_state(|s| {
            s.follows
                .iter()
                .filter(|(_, followee)| followee == user)
                .map(|(follower, _)| follower.clone())
                .collect()
        }))
    }

    async fn get_following(&self, user: &Principal) -> ActorResult<Vec<Principal>> {
        self.backend.enter(method::GET_FOLLOWING).await?;
        Ok(self.backend.with_state(|s| {
            s.follows
                .iter()
                .filter(|(follower, _)| follower == user)
                .map(|(_, followee)| followee.clone())
                .collect()
        }))
    }

    async fn follow_user(&self, target: &Principal) -> ActorResult<()> {
        self.backend.enter(method::FOLLOW_USER).await?;
        self.require_user()?;
        if target == &self.caller {
            return Err(ActorError::Rejected("cannot follow yourself".into()));
        }
        self.backend.with_state(|s| {
            s.follows.insert((self.caller.clone(), target.clone()));
        });
        Ok(())
    }

    async fn unfollow_user(&self, target: &Principal) -> ActorResult<()> {
        self.backend.enter(method::UNFOLLOW_USER).await?;
        self.require_user()?;
        self.backend.with_state(|s| {
            s.follows.remove(&(self.caller.clone(), target.clone()));
        });
        Ok(())
    }

    async fn get_all_reels(&self) -> ActorResult<Vec<Reel>> {
        self.backend.enter(method::GET_ALL_REELS).await?;
        Ok(self.backend.with_state(|s| s.reels.clone()))
    }

    async fn add_reel(&self, video: BlobHandle, caption: String) -> ActorResult<()> {
        self.backend.enter(method::ADD_REEL).await?;
        self.require_user()?;
        self.backend.with_state(|s| {
            s.reels.push(Reel {
                id: Uuid::new_v4().to_string(),
                video,
                author: self.caller.clone(),
                timestamp: Utc::now(),
                caption,
            });
        });
        Ok(())
    }

    async fn delete_reel(&self, reel_id: &str) -> ActorResult<()> {
        self.backend.enter(method::DELETE_REEL).await?;
        self.backend.with_state(|s| {
            let Some(idx) = s.reels.iter().position(|r| r.id == reel_id) else {
                return Err(ActorError::Rejected(format!("no reel {}", reel_id)));
            };
            if s.reels[idx].author != self.caller {
                return Err(ActorError::Unauthorized("only the author can delete a reel".into()));
            }
            s.reels.remove(idx);
            Ok(())
        })
    }

    async fn get_all_stories(&self) -> ActorResult<Vec<Story>> {
        self.backend.enter(method::GET_ALL_STORIES).await?;
        Ok(self.backend.with_state(|s| s.stories.clone()))
    }

    async fn add_story(&self, content: BlobHandle) -> ActorResult<()> {
        self.backend.enter(method::ADD_STORY).await?;
        self.require_user()?;
        let now = Utc::now();
        self.backend.with_state(|s| {
            s.stories.push(Story {
                id: Uuid::new_v4().to_string(),
                content,
                author: self.caller.clone(),
                timestamp: now,
                expires_at: now + chrono::Duration::hours(STORY_TTL_HOURS),
            });
        });
        Ok(())
    }

    async fn delete_story(&self, story_id: &str) -> ActorResult<()> {
        self.backend.enter(method::DELETE_STORY).await?;
        self.backend.with_state(|s| {
            let Some(idx) = s.stories.iter().position(|st| st.id == story_id) else {
                return Err(ActorError::Rejected(format!("no story {}", story_id)));
            };
            if s.stories[idx].author != self.caller {
                return Err(ActorError::Unauthorized("only the author can delete a story".into()));
            }
            s.stories.remove(idx);
            Ok(())
        })
    }

    async fn get_messages(&self, other_user: &Principal) -> ActorResult<Vec<Message>> {
        self.backend.enter(method::GET_MESSAGES).await?;
        Ok(self.backend.with_state(|s| {
            s.messages
                .iter()
                .filter(|m| {
                    (m.sender == self.caller && &m.recipient == other_user)
                        || (&m.sender == other_user && m.recipient == self.caller)
                })
                .cloned()
                .collect()
        }))
    }

    async fn send_message(&self, recipient: &Principal, text: String) -> ActorResult<()> {
        self.backend.enter(method::SEND_MESSAGE).await?;
        self.require_user()?;
        self.backend.with_state(|s| {
            s.messages.push(Message {
                text,
                sender: self.caller.clone(),
                recipient: recipient.clone(),
                timestamp: Utc::now(),
            });
        });
        Ok(())
    }

    async fn get_caller_user_role(&self) -> ActorResult<UserRole> {
        self.backend.enter(method::GET_CALLER_USER_ROLE).await?;
        if self.caller.is_anonymous() {
            return Ok(UserRole::Guest);
        }
        Ok(self
            .backend
            .with_state(|s| s.roles.get(&self.caller).copied().unwrap_or(UserRole::User)))
    }

    async fn is_caller_admin(&self) -> ActorResult<bool> {
        self.backend.enter(method::IS_CALLER_ADMIN).await?;
        Ok(self
            .backend
            .with_state(|s| s.roles.get(&self.caller) == Some(&UserRole::Admin)))
    }

    async fn assign_caller_user_role(&self, user: &Principal, role: UserRole) -> ActorResult<()> {
        self.backend.enter(method::ASSIGN_CALLER_USER_ROLE).await?;
        self.backend.with_state(|s| {
            if s.roles.get(&self.caller) != Some(&UserRole::Admin) {
                return Err(ActorError::Unauthorized("only admins can assign roles".into()));
            }
            s.roles.insert(user.clone(), role);
            Ok(())
        })
    }
}

/// Keeps uploaded media in memory and hands out `mem://` URLs.
#[derive(Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, (String, Bytes)>>>,
    chunk: usize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: Arc::default(),
            chunk: 64 * 1024,
        }
    }

    pub fn get(&self, url: &str) -> Option<(String, Bytes)> {
        self.blobs.lock().get(url).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        content_type: &str,
        bytes: Bytes,
        progress: Arc<UploadProgress>,
    ) -> ActorResult<BlobHandle> {
        progress.begin(bytes.len() as u64);
        for part in slices(&bytes, self.chunk) {
            progress.advance(part.len() as u64);
            tokio::task::yield_now().await;
        }

        let url = format!("mem://blobs/{}", Uuid::new_v4());
        self.blobs
            .lock()
            .insert(url.clone(), (content_type.to_string(), bytes));
        progress.finish(true);
        Ok(BlobHandle::from_url(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(s: &str) -> Principal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn follow_edges_show_up_in_both_lists() {
        let backend = MemoryBackend::new();
        let alice = backend.actor_for(principal("alice"));

        alice.follow_user(&principal("bob")).await.unwrap();

        assert_eq!(alice.get_following(&principal("alice")).await.unwrap(), vec![principal("bob")]);
        assert_eq!(alice.get_followers(&principal("bob")).await.unwrap(), vec![principal("alice")]);
        assert!(alice.follow_user(&principal("alice")).await.is_err());
    }

    #[tokio::test]
    async fn injected_failure_is_consumed_once() {
        let backend = MemoryBackend::new();
        let actor = backend.actor_for(principal("alice"));
        backend.fail_next(method::GET_ALL_REELS, ActorError::Transport("down".into()));

        assert!(actor.get_all_reels().await.is_err());
        assert!(actor.get_all_reels().await.is_ok());
        assert_eq!(backend.calls(method::GET_ALL_REELS), 2);
    }

    #[tokio::test]
    async fn only_author_deletes_reel() {
        let backend = MemoryBackend::new();
        let alice = backend.actor_for(principal("alice"));
        let bob = backend.actor_for(principal("bob"));

        alice
            .add_reel(BlobHandle::from_url("mem://v"), "hi".into())
            .await
            .unwrap();
        let id = alice.get_all_reels().await.unwrap()[0].id.clone();

        assert!(matches!(bob.delete_reel(&id).await, Err(ActorError::Unauthorized(_))));
        alice.delete_reel(&id).await.unwrap();
        assert!(alice.get_all_reels().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_blob_store_reports_completion() {
        let store = MemoryBlobStore::new();
        let progress = Arc::new(UploadProgress::new());
        let handle = store
            .put("video/mp4", Bytes::from(vec![0u8; 200_000]), progress.clone())
            .await
            .unwrap();

        assert_eq!(progress.percent(), 100);
        let BlobHandle::Url(url) = handle else { panic!("expected url handle") };
        assert_eq!(store.get(&url).unwrap().0, "video/mp4");
    }
}
