use connect_sync::MutationOutcome;
use connect_types::api::method;
use connect_types::{BlobHandle, Principal, UserProfile, UserRole};

use crate::client::SocialClient;
use crate::error::{ClientError, ClientResult};
use crate::keys;
use crate::upload::{self, ProgressFn};
use crate::validation::{self, Media, MediaKind, ProfileDraft, ValidationError};

/// Picture used when a profile is set up without one.
pub const DEFAULT_AVATAR: &str = "/assets/generated/default-avatar.dim_200x200.png";

impl SocialClient {
    /// Create or fully replace the caller's profile.
    ///
    /// The current profile is read inside the write so its counts and
    /// picture carry over. A new picture is uploaded first; without one the
    /// current picture is kept, or the default avatar on first setup.
    pub async fn save_caller_profile(
        &self,
        draft: ProfileDraft,
        on_progress: Option<ProgressFn>,
    ) -> ClientResult<MutationOutcome<()>> {
        const OP: &str = method::SAVE_CALLER_USER_PROFILE;
        if let Err(e) = draft.validate() {
            return Err(self.reject(OP, e));
        }
        let id = self.writer(OP)?;
        let current_key = keys::caller_profile(&id.principal);
        let source = self.caller_profile_source();
        let opts = self.opts();

        let cache = self.inner.cache.clone();
        let blobs = self.inner.blobs.clone();
        let notices = self.inner.notices.clone();
        let call = async move {
            let existing: Option<UserProfile> = (*cache.fetch(&current_key, &opts, source).await?).clone();
            let mut draft = draft;
            let picture = match (draft.picture.take(), &existing) {
                (Some(media), _) => upload::upload(&*blobs, &notices, OP, media, on_progress).await?,
                (None, Some(current)) => current.profile_picture.clone(),
                (None, None) => BlobHandle::from_url(DEFAULT_AVATAR),
            };
            let profile = draft.into_profile(picture, existing.as_ref());
            id.actor
                .save_caller_user_profile(profile)
                .await
                .map_err(ClientError::from)
        };
        self.mutate(keys::save_profile(), keys::lock::SAVE_PROFILE.to_string(), call)
            .await
    }

    pub async fn follow(&self, target: &Principal) -> ClientResult<MutationOutcome<()>> {
        let id = self.writer(method::FOLLOW_USER)?;
        if *target == id.principal {
            return Err(self.reject(method::FOLLOW_USER, ValidationError::SelfFollow));
        }
        let target = target.clone();
        let lock = keys::lock::follow(&target);
        let call = async move { id.actor.follow_user(&target).await.map_err(ClientError::from) };
        self.mutate(keys::follow(), lock, call).await
    }

    pub async fn unfollow(&self, target: &Principal) -> ClientResult<MutationOutcome<()>> {
        let id = self.writer(method::UNFOLLOW_USER)?;
        let target = target.clone();
        let lock = keys::lock::follow(&target);
        let call = async move { id.actor.unfollow_user(&target).await.map_err(ClientError::from) };
        self.mutate(keys::unfollow(), lock, call).await
    }

    /// Follow or unfollow depending on the current state. Completes with
    /// the new state: `true` when now following.
    pub async fn toggle_follow(&self, target: &Principal) -> ClientResult<MutationOutcome<bool>> {
        let following = match self.is_following(target).await {
            Ok(following) => following,
            Err(e) => return Err(self.fail(method::FOLLOW_USER, e)),
        };
        let outcome = if following {
            self.unfollow(target).await?.completed().map(|_| false)
        } else {
            self.follow(target).await?.completed().map(|_| true)
        };
        Ok(outcome.map_or(MutationOutcome::AlreadyPending, MutationOutcome::Completed))
    }

    pub async fn add_reel(
        &self,
        video: Media,
        caption: &str,
        on_progress: Option<ProgressFn>,
    ) -> ClientResult<MutationOutcome<()>> {
        const OP: &str = method::ADD_REEL;
        if let Err(e) = validation::media(MediaKind::Video, &video) {
            return Err(self.reject(OP, e));
        }
        let id = self.writer(OP)?;
        let caption = validation::caption(caption);

        let blobs = self.inner.blobs.clone();
        let notices = self.inner.notices.clone();
        let call = async move {
            let handle = upload::upload(&*blobs, &notices, OP, video, on_progress).await?;
            id.actor.add_reel(handle, caption).await.map_err(ClientError::from)
        };
        self.mutate(keys::add_reel(), keys::lock::ADD_REEL.to_string(), call)
            .await
    }

    pub async fn delete_reel(&self, reel_id: &str) -> ClientResult<MutationOutcome<()>> {
        let id = self.writer(method::DELETE_REEL)?;
        let reel_id = reel_id.to_string();
        let lock = keys::lock::delete_reel(&reel_id);
        let call = async move { id.actor.delete_reel(&reel_id).await.map_err(ClientError::from) };
        self.mutate(keys::delete_reel(), lock, call).await
    }

    pub async fn add_story(
        &self,
        image: Media,
        on_progress: Option<ProgressFn>,
    ) -> ClientResult<MutationOutcome<()>> {
        const OP: &str = method::ADD_STORY;
        if let Err(e) = validation::media(MediaKind::Image, &image) {
            return Err(self.reject(OP, e));
        }
        let id = self.writer(OP)?;

        let blobs = self.inner.blobs.clone();
        let notices = self.inner.notices.clone();
        let call = async move {
            let handle = upload::upload(&*blobs, &notices, OP, image, on_progress).await?;
            id.actor.add_story(handle).await.map_err(ClientError::from)
        };
        self.mutate(keys::add_story(), keys::lock::ADD_STORY.to_string(), call)
            .await
    }

    pub async fn delete_story(&self, story_id: &str) -> ClientResult<MutationOutcome<()>> {
        let id = self.writer(method::DELETE_STORY)?;
        let story_id = story_id.to_string();
        let lock = keys::lock::delete_story(&story_id);
        let call = async move { id.actor.delete_story(&story_id).await.map_err(ClientError::from) };
        self.mutate(keys::delete_story(), lock, call).await
    }

    /// Never replayed: a failed send is reported, not retried.
    pub async fn send_message(&self, recipient: &Principal, text: &str) -> ClientResult<MutationOutcome<()>> {
        let text = match validation::message_text(text) {
            Ok(text) => text,
            Err(e) => return Err(self.reject(method::SEND_MESSAGE, e)),
        };
        let id = self.writer(method::SEND_MESSAGE)?;
        self.open_conversation(recipient);

        let recipient = recipient.clone();
        let spec = keys::send_message(&recipient);
        let lock = keys::lock::send_message(&recipient);
        let call = async move {
            id.actor
                .send_message(&recipient, text)
                .await
                .map_err(ClientError::from)
        };
        self.mutate(spec, lock, call).await
    }

    pub async fn assign_role(&self, user: &Principal, role: UserRole) -> ClientResult<MutationOutcome<()>> {
        let id = self.writer(method::ASSIGN_CALLER_USER_ROLE)?;
        let user = user.clone();
        let lock = keys::lock::assign_role(&user);
        let call = async move {
            id.actor
                .assign_caller_user_role(&user, role)
                .await
                .map_err(ClientError::from)
        };
        self.mutate(keys::assign_role(), lock, call).await
    }
}
