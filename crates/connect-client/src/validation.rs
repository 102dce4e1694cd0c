//! Checks applied before any write is sent.
//!
//! Everything here is pure; a failure means the backend was never called.

use bytes::Bytes;

use connect_types::{BlobHandle, UserProfile};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("message cannot be empty")]
    EmptyMessage,

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("expected {expected} media, got '{actual}'")]
    WrongMediaType { expected: MediaKind, actual: String },

    #[error("media payload is empty")]
    EmptyMedia,

    #[error("you cannot follow yourself")]
    SelfFollow,
}

/// Which family of content types an upload slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Video => "video/",
            Self::Image => "image/",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// A local file picked for upload.
#[derive(Debug, Clone)]
pub struct Media {
    pub content_type: String,
    pub bytes: Bytes,
}

impl Media {
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

pub fn media(kind: MediaKind, media: &Media) -> Result<(), ValidationError> {
    let ct = media.content_type.trim().to_ascii_lowercase();
    if !ct.starts_with(kind.prefix()) {
        return Err(ValidationError::WrongMediaType {
            expected: kind,
            actual: media.content_type.clone(),
        });
    }
    if media.bytes.is_empty() {
        return Err(ValidationError::EmptyMedia);
    }
    Ok(())
}

/// Trimmed message body, or an error if nothing is left.
pub fn message_text(raw: &str) -> Result<String, ValidationError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    Ok(text.to_string())
}

pub fn caption(raw: &str) -> String {
    raw.trim().to_string()
}

/// Editable profile fields. Counts are never edited by the user.
#[derive(Debug, Clone, Default)]
pub struct ProfileDraft {
    pub username: String,
    pub display_name: String,
    pub bio: String,
    /// New picture; `None` keeps the current one.
    pub picture: Option<Media>,
}

impl ProfileDraft {
    pub fn new(username: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    pub fn bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = bio.into();
        self
    }

    pub fn picture(mut self, media: Media) -> Self {
        self.picture = Some(media);
        self
    }

    /// Trim and check the text fields, and the picture if one was given.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.username.trim().is_empty() {
            return Err(ValidationError::MissingField("username"));
        }
        if self.display_name.trim().is_empty() {
            return Err(ValidationError::MissingField("display name"));
        }
        if let Some(pic) = &self.picture {
            media(MediaKind::Image, pic)?;
        }
        Ok(())
    }

    /// Build the full replacement record. Counts come from `existing`, or
    /// start at zero on first setup.
    pub fn into_profile(self, picture: BlobHandle, existing: Option<&UserProfile>) -> UserProfile {
        UserProfile {
            username: self.username.trim().to_string(),
            display_name: self.display_name.trim().to_string(),
            bio: self.bio.trim().to_string(),
            profile_picture: picture,
            follower_count: existing.map_or(0, |p| p.follower_count),
            following_count: existing.map_or(0, |p| p.following_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_message_is_rejected() {
        assert_eq!(message_text("  \n\t "), Err(ValidationError::EmptyMessage));
        assert_eq!(message_text("  hi there ").unwrap(), "hi there");
    }

    #[test]
    fn media_type_must_match_slot() {
        let clip = Media::new("video/mp4", vec![1u8, 2, 3]);
        let photo = Media::new("image/png", vec![1u8]);

        assert!(media(MediaKind::Video, &clip).is_ok());
        assert!(matches!(
            media(MediaKind::Video, &photo),
            Err(ValidationError::WrongMediaType { expected: MediaKind::Video, .. })
        ));
        assert_eq!(
            media(MediaKind::Image, &Media::new("image/jpeg", Bytes::new())),
            Err(ValidationError::EmptyMedia)
        );
    }

    #[test]
    fn profile_requires_names_after_trim() {
        assert_eq!(
            ProfileDraft::new("   ", "Alice").validate(),
            Err(ValidationError::MissingField("username"))
        );
        assert_eq!(
            ProfileDraft::new("alice", " ").validate(),
            Err(ValidationError::MissingField("display name"))
        );
    }

    #[test]
    fn profile_keeps_existing_counts() {
        let existing = UserProfile {
            username: "old".into(),
            display_name: "Old".into(),
            bio: String::new(),
            profile_picture: BlobHandle::from_url("mem://a"),
            follower_count: 4,
            following_count: 2,
        };

        let profile = ProfileDraft::new(" alice ", " Alice ")
            .bio(" hello ")
            .into_profile(BlobHandle::from_url("mem://b"), Some(&existing));

        assert_eq!(profile.username, "alice");
        assert_eq!(profile.bio, "hello");
        assert_eq!((profile.follower_count, profile.following_count), (4, 2));
    }
}
