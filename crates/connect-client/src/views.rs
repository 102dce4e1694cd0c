//! Display-side shaping of fetched lists.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use connect_types::{Message, Principal, Reel, Story};

/// Drop every story whose `expires_at` is at or before `now`.
pub fn live_stories(stories: Vec<Story>, now: DateTime<Utc>) -> Vec<Story> {
    stories.into_iter().filter(|s| s.is_live_at(now)).collect()
}

/// Newest first.
pub fn sort_reels(reels: &mut [Reel]) {
    reels.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Oldest first. Stable, so equal timestamps keep backend order.
pub fn sort_thread(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.timestamp);
}

pub fn reels_by(reels: &[Reel], author: &Principal) -> Vec<Reel> {
    reels.iter().filter(|r| &r.author == author).cloned().collect()
}

/// Stories bucketed by author for the stories bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoryGroups {
    /// The caller's own stories, oldest first
    pub own: Vec<Story>,
    /// Everyone else, one bucket per author, each oldest first
    pub others: BTreeMap<Principal, Vec<Story>>,
}

impl StoryGroups {
    pub fn build(stories: &[Story], me: &Principal) -> Self {
        let mut groups = Self::default();
        for story in stories {
            if &story.author == me {
                groups.own.push(story.clone());
            } else {
                groups
                    .others
                    .entry(story.author.clone())
                    .or_default()
                    .push(story.clone());
            }
        }
        groups.own.sort_by_key(|s| s.timestamp);
        for bucket in groups.others.values_mut() {
            bucket.sort_by_key(|s| s.timestamp);
        }
        groups
    }

    pub fn is_empty(&self) -> bool {
        self.own.is_empty() && self.others.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use connect_types::BlobHandle;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn story(id: &str, author: &str, posted: i64, expires: i64) -> Story {
        Story {
            id: id.into(),
            content: BlobHandle::from_url("mem://s"),
            author: author.parse().unwrap(),
            timestamp: at(posted),
            expires_at: at(expires),
        }
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let now = at(100);
        let kept = live_stories(
            vec![story("a", "x", 0, 99), story("b", "x", 0, 100), story("c", "x", 0, 101)],
            now,
        );
        let ids: Vec<_> = kept.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["c"]);
    }

    #[test]
    fn thread_sort_is_stable() {
        let me: Principal = "me".parse().unwrap();
        let you: Principal = "you".parse().unwrap();
        let msg = |text: &str, t: i64| Message {
            text: text.into(),
            sender: me.clone(),
            recipient: you.clone(),
            timestamp: at(t),
        };
        let mut thread = vec![msg("late", 5), msg("tie-1", 2), msg("tie-2", 2), msg("early", 1)];

        sort_thread(&mut thread);

        let texts: Vec<_> = thread.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["early", "tie-1", "tie-2", "late"]);
    }

    #[test]
    fn own_stories_are_split_out() {
        let me: Principal = "me".parse().unwrap();
        let stories = [story("1", "me", 5, 500), story("2", "bob", 3, 500), story("3", "bob", 1, 500)];

        let groups = StoryGroups::build(&stories, &me);

        assert_eq!(groups.own.len(), 1);
        let bob: Vec<_> = groups.others[&"bob".parse::<Principal>().unwrap()]
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(bob, ["3", "2"]);
    }
}
