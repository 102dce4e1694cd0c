use std::sync::Arc;

use connect_sync::{SyncError, Watch};
use connect_types::{Message, Principal, Reel, Story, UserProfile, UserRole};

use crate::client::{Fetch, SocialClient};
use crate::error::ClientResult;
use crate::keys;
use crate::views::{self, StoryGroups};

/// Fetchers, shared by the one-shot reads and their live variants.
impl SocialClient {
    pub(crate) fn caller_profile_source(&self) -> impl Fn() -> Fetch<Option<UserProfile>> + Send + Sync + 'static {
        self.fetcher(|id| async move {
            id.actor.get_caller_user_profile().await.map_err(SyncError::from)
        })
    }

    fn user_profile_source(
        &self,
        user: &Principal,
    ) -> impl Fn() -> Fetch<Option<UserProfile>> + Send + Sync + 'static {
        let user = user.clone();
        self.fetcher(move |id| {
            let user = user.clone();
            async move { id.actor.get_user_profile(&user).await.map_err(SyncError::from) }
        })
    }

    fn followers_source(&self, user: &Principal) -> impl Fn() -> Fetch<Vec<Principal>> + Send + Sync + 'static {
        let user = user.clone();
        self.fetcher(move |id| {
            let user = user.clone();
            async move { id.actor.get_followers(&user).await.map_err(SyncError::from) }
        })
    }

    fn following_source(&self, user: &Principal) -> impl Fn() -> Fetch<Vec<Principal>> + Send + Sync + 'static {
        let user = user.clone();
        self.fetcher(move |id| {
            let user = user.clone();
            async move { id.actor.get_following(&user).await.map_err(SyncError::from) }
        })
    }

    fn reels_source(&self) -> impl Fn() -> Fetch<Vec<Reel>> + Send + Sync + 'static {
        self.fetcher(|id| async move {
            let mut reels = id.actor.get_all_reels().await?;
            views::sort_reels(&mut reels);
            Ok::<_, SyncError>(reels)
        })
    }

    /// Expired stories are dropped against the clock at the moment the
    /// response arrives, before anything is cached.
    fn stories_source(&self) -> impl Fn() -> Fetch<Vec<Story>> + Send + Sync + 'static {
        let clock = self.inner.clock.clone();
        self.fetcher(move |id| {
            let clock = clock.clone();
            async move {
                let stories = id.actor.get_all_stories().await?;
                Ok::<_, SyncError>(views::live_stories(stories, clock.now()))
            }
        })
    }

    fn messages_source(&self, other: &Principal) -> impl Fn() -> Fetch<Vec<Message>> + Send + Sync + 'static {
        let other = other.clone();
        self.fetcher(move |id| {
            let other = other.clone();
            async move {
                let mut thread = id.actor.get_messages(&other).await?;
                views::sort_thread(&mut thread);
                Ok::<_, SyncError>(thread)
            }
        })
    }

    fn caller_role_source(&self) -> impl Fn() -> Fetch<UserRole> + Send + Sync + 'static {
        self.fetcher(|id| async move {
            id.actor.get_caller_user_role().await.map_err(SyncError::from)
        })
    }

    fn is_admin_source(&self) -> impl Fn() -> Fetch<bool> + Send + Sync + 'static {
        self.fetcher(|id| async move { id.actor.is_caller_admin().await.map_err(SyncError::from) })
    }
}

/// Reads.
impl SocialClient {
    /// `None` means the caller has not set up a profile yet.
    pub async fn caller_profile(&self) -> ClientResult<Arc<Option<UserProfile>>> {
        let me = self.identity()?.principal;
        self.read(keys::caller_profile(&me), self.caller_profile_source()).await
    }

    pub async fn needs_profile_setup(&self) -> ClientResult<bool> {
        Ok(self.caller_profile().await?.is_none())
    }

    pub async fn user_profile(&self, user: &Principal) -> ClientResult<Arc<Option<UserProfile>>> {
        self.read(keys::user_profile(user), self.user_profile_source(user)).await
    }

    pub async fn followers(&self, user: &Principal) -> ClientResult<Arc<Vec<Principal>>> {
        self.read(keys::followers(user), self.followers_source(user)).await
    }

    pub async fn following(&self, user: &Principal) -> ClientResult<Arc<Vec<Principal>>> {
        self.read(keys::following(user), self.following_source(user)).await
    }

    /// Whether the caller follows `target`, from the caller's following list.
    pub async fn is_following(&self, target: &Principal) -> ClientResult<bool> {
        let me = self.identity()?.principal;
        Ok(self.following(&me).await?.contains(target))
    }

    /// All reels, newest first.
    pub async fn reels(&self) -> ClientResult<Arc<Vec<Reel>>> {
        self.read(keys::reels(), self.reels_source()).await
    }

    pub async fn reels_by_author(&self, author: &Principal) -> ClientResult<Vec<Reel>> {
        Ok(views::reels_by(&self.reels().await?, author))
    }

    /// Live stories only.
    pub async fn stories(&self) -> ClientResult<Arc<Vec<Story>>> {
        self.read(keys::stories(), self.stories_source()).await
    }

    pub async fn story_groups(&self) -> ClientResult<StoryGroups> {
        let me = self.identity()?.principal;
        Ok(StoryGroups::build(&self.stories().await?, &me))
    }

    /// Two-party thread, oldest first.
    pub async fn messages(&self, other: &Principal) -> ClientResult<Arc<Vec<Message>>> {
        let me = self.identity()?.principal;
        self.read(keys::messages(other, &me), self.messages_source(other)).await
    }

    pub async fn caller_role(&self) -> ClientResult<Arc<UserRole>> {
        let me = self.identity()?.principal;
        self.read(keys::caller_role(&me), self.caller_role_source()).await
    }

    pub async fn is_caller_admin(&self) -> ClientResult<bool> {
        let me = self.identity()?.principal;
        Ok(*self.read(keys::is_admin(&me), self.is_admin_source()).await?)
    }
}

/// Live views. The ones keyed by the caller need an identity up front;
/// the rest wait for one.
impl SocialClient {
    pub fn watch_caller_profile(&self) -> ClientResult<Watch<Option<UserProfile>>> {
        let me = self.identity()?.principal;
        Ok(self.live(keys::caller_profile(&me), None, self.caller_profile_source()))
    }

    pub fn watch_user_profile(&self, user: &Principal) -> Watch<Option<UserProfile>> {
        self.live(keys::user_profile(user), None, self.user_profile_source(user))
    }

    pub fn watch_followers(&self, user: &Principal) -> Watch<Vec<Principal>> {
        self.live(keys::followers(user), None, self.followers_source(user))
    }

    pub fn watch_following(&self, user: &Principal) -> Watch<Vec<Principal>> {
        self.live(keys::following(user), None, self.following_source(user))
    }

    pub fn watch_reels(&self) -> Watch<Vec<Reel>> {
        let every = self.inner.settings.reels_poll;
        self.live(keys::reels(), Some(every), self.reels_source())
    }

    pub fn watch_stories(&self) -> Watch<Vec<Story>> {
        let every = self.inner.settings.stories_poll;
        self.live(keys::stories(), Some(every), self.stories_source())
    }

    /// Opening a thread also records the peer in [`conversations`](Self::conversations).
    pub fn watch_messages(&self, other: &Principal) -> ClientResult<Watch<Vec<Message>>> {
        let me = self.identity()?.principal;
        self.open_conversation(other);
        let every = self.inner.settings.messages_poll;
        Ok(self.live(keys::messages(other, &me), Some(every), self.messages_source(other)))
    }

    pub fn watch_caller_role(&self) -> ClientResult<Watch<UserRole>> {
        let me = self.identity()?.principal;
        Ok(self.live(keys::caller_role(&me), None, self.caller_role_source()))
    }

    pub fn watch_is_admin(&self) -> ClientResult<Watch<bool>> {
        let me = self.identity()?.principal;
        Ok(self.live(keys::is_admin(&me), None, self.is_admin_source()))
    }
}
