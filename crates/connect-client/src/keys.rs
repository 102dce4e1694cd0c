//! Query keys and the invalidation table.
//!
//! Keys that depend on who is asking carry the caller as a trailing
//! segment, so a new identity never reads the previous one's entries. Every
//! mutation lists the prefixes it invalidates here and nowhere else.

use connect_sync::{MutationSpec, QueryKey};
use connect_types::Principal;
use connect_types::api::method;

pub const CALLER_PROFILE: &str = "callerProfile";
pub const USER_PROFILE: &str = "userProfile";
pub const FOLLOWERS: &str = "followers";
pub const FOLLOWING: &str = "following";
pub const REELS: &str = "reels";
pub const STORIES: &str = "stories";
pub const MESSAGES: &str = "messages";
pub const CALLER_ROLE: &str = "callerRole";
pub const IS_ADMIN: &str = "isAdmin";

pub fn prefix(operation: &str) -> QueryKey {
    QueryKey::new(operation)
}

pub fn caller_profile(me: &Principal) -> QueryKey {
    QueryKey::new(CALLER_PROFILE).with(me)
}

pub fn user_profile(user: &Principal) -> QueryKey {
    QueryKey::new(USER_PROFILE).with(user)
}

pub fn followers(user: &Principal) -> QueryKey {
    QueryKey::new(FOLLOWERS).with(user)
}

pub fn following(user: &Principal) -> QueryKey {
    QueryKey::new(FOLLOWING).with(user)
}

pub fn reels() -> QueryKey {
    QueryKey::new(REELS)
}

pub fn stories() -> QueryKey {
    QueryKey::new(STORIES)
}

/// `messages/<other>/<me>`; the send mutation invalidates `messages/<other>`.
pub fn messages(other: &Principal, me: &Principal) -> QueryKey {
    QueryKey::new(MESSAGES).with(other).with(me)
}

pub fn caller_role(me: &Principal) -> QueryKey {
    QueryKey::new(CALLER_ROLE).with(me)
}

pub fn is_admin(me: &Principal) -> QueryKey {
    QueryKey::new(IS_ADMIN).with(me)
}

pub mod lock {
    use connect_types::Principal;

    pub const SAVE_PROFILE: &str = "profile/save";
    pub const ADD_REEL: &str = "reel/add";
    pub const ADD_STORY: &str = "story/add";

    /// Follow and unfollow share one lock so a toggle can't race itself.
    pub fn follow(target: &Principal) -> String {
        format!("follow/{}", target)
    }

    pub fn delete_reel(id: &str) -> String {
        format!("reel/delete/{}", id)
    }

    pub fn delete_story(id: &str) -> String {
        format!("story/delete/{}", id)
    }

    pub fn send_message(recipient: &Principal) -> String {
        format!("message/send/{}", recipient)
    }

    pub fn assign_role(user: &Principal) -> String {
        format!("role/assign/{}", user)
    }
}

pub fn save_profile() -> MutationSpec {
    MutationSpec::new(method::SAVE_CALLER_USER_PROFILE)
        .invalidating(prefix(CALLER_PROFILE))
        .invalidating(prefix(USER_PROFILE))
}

/// Counts change on both sides of the edge, so profiles go too.
fn follow_graph(name: &'static str) -> MutationSpec {
    MutationSpec::new(name)
        .invalidating(prefix(FOLLOWERS))
        .invalidating(prefix(FOLLOWING))
        .invalidating(prefix(USER_PROFILE))
        .invalidating(prefix(CALLER_PROFILE))
}

pub fn follow() -> MutationSpec {
    follow_graph(method::FOLLOW_USER)
}

pub fn unfollow() -> MutationSpec {
    follow_graph(method::UNFOLLOW_USER)
}

pub fn add_reel() -> MutationSpec {
    MutationSpec::new(method::ADD_REEL).invalidating(prefix(REELS))
}

pub fn delete_reel() -> MutationSpec {
    MutationSpec::new(method::DELETE_REEL).invalidating(prefix(REELS))
}

pub fn add_story() -> MutationSpec {
    MutationSpec::new(method::ADD_STORY).invalidating(prefix(STORIES))
}

pub fn delete_story() -> MutationSpec {
    MutationSpec::new(method::DELETE_STORY).invalidating(prefix(STORIES))
}

pub fn send_message(recipient: &Principal) -> MutationSpec {
    MutationSpec::new(method::SEND_MESSAGE).invalidating(QueryKey::new(MESSAGES).with(recipient))
}

pub fn assign_role() -> MutationSpec {
    MutationSpec::new(method::ASSIGN_CALLER_USER_ROLE)
        .invalidating(prefix(CALLER_ROLE))
        .invalidating(prefix(IS_ADMIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Principal {
        s.parse().unwrap()
    }

    #[test]
    fn follow_reaches_both_parties() {
        let spec = follow();
        let alice = p("alice");
        let bob = p("bob");

        for key in [following(&alice), followers(&bob), user_profile(&bob), caller_profile(&alice)] {
            assert!(spec.invalidates.iter().any(|pre| key.starts_with(pre)), "{} not covered", key);
        }
        assert!(!spec.invalidates.iter().any(|pre| reels().starts_with(pre)));
    }

    #[test]
    fn send_only_touches_that_thread() {
        let spec = send_message(&p("bob"));
        let me = p("alice");

        assert!(spec.invalidates.iter().any(|pre| messages(&p("bob"), &me).starts_with(pre)));
        assert!(!spec.invalidates.iter().any(|pre| messages(&p("carol"), &me).starts_with(pre)));
    }
}
