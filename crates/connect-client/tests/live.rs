/// Integration tests: live views, polling cadence and readiness.

use std::sync::Arc;
use std::time::Duration;

use connect_actor::{MemoryBackend, MemoryBlobStore};
use connect_client::{SocialClient, SyncSettings};
use connect_types::Principal;
use connect_types::api::method;

fn p(s: &str) -> Principal {
    s.parse().unwrap()
}

fn client() -> SocialClient {
    SocialClient::builder(Arc::new(MemoryBlobStore::new()))
        .settings(SyncSettings {
            reels_poll: Duration::from_secs(30),
            stories_poll: Duration::from_secs(30),
            messages_poll: Duration::from_secs(5),
            ..SyncSettings::default()
        })
        .build()
}

#[tokio::test(start_paused = true)]
async fn message_thread_polls_every_interval() {
    let backend = MemoryBackend::new();
    let client = client();
    client.connect(Arc::new(backend.actor_for(p("alice"))), p("alice"));

    let _thread = client.watch_messages(&p("bob")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(backend.calls(method::GET_MESSAGES), 1);

    // ticks at 5s and 10s
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(backend.calls(method::GET_MESSAGES), 3);
}

#[tokio::test(start_paused = true)]
async fn slow_polls_never_overlap() {
    let backend = MemoryBackend::new();
    backend.set_latency(Duration::from_secs(3));
    let client = client();
    client.connect(Arc::new(backend.actor_for(p("alice"))), p("alice"));

    let _thread = client.watch_messages(&p("bob")).unwrap();
    // fetches start at 0, 8 and 16: each tick waits a full interval after
    // the previous response
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(backend.calls(method::GET_MESSAGES), 3);
}

#[tokio::test(start_paused = true)]
async fn feed_waits_for_identity() {
    let backend = MemoryBackend::new();
    let client = client();

    let mut reels = client.watch_reels();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.total_calls(), 0);

    client.connect(Arc::new(backend.actor_for(p("alice"))), p("alice"));
    let snap = reels.settled().await;
    assert!(snap.data.is_some());
    assert_eq!(backend.calls(method::GET_ALL_REELS), 1);
}

#[tokio::test(start_paused = true)]
async fn sent_message_refreshes_open_thread() {
    let backend = MemoryBackend::new();
    let client = client();
    client.connect(Arc::new(backend.actor_for(p("alice"))), p("alice"));

    let thread = client.watch_messages(&p("bob")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(thread.data().map(|t| t.len()), Some(0));

    client.send_message(&p("bob"), "hello").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let texts: Vec<_> = thread.data().unwrap().iter().map(|m| m.text.clone()).collect();
    assert_eq!(texts, ["hello"]);
    assert_eq!(backend.calls(method::GET_MESSAGES), 2);
}

#[tokio::test(start_paused = true)]
async fn dropping_view_stops_polling() {
    let backend = MemoryBackend::new();
    let client = client();
    client.connect(Arc::new(backend.actor_for(p("alice"))), p("alice"));

    let stories = client.watch_stories();
    tokio::time::sleep(Duration::from_millis(10)).await;
    drop(stories);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(backend.calls(method::GET_ALL_STORIES), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_leaves_open_views_stale() {
    let backend = MemoryBackend::new();
    let client = client();
    client.connect(Arc::new(backend.actor_for(p("alice"))), p("alice"));

    let following = client.watch_following(&p("alice"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!following.snapshot().is_stale);

    client.disconnect();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let snap = following.snapshot();
    assert!(!client.session().is_ready());
    assert!(snap.is_stale);
    assert_eq!(backend.calls(method::GET_FOLLOWING), 1);

    client.connect(Arc::new(backend.actor_for(p("alice"))), p("alice"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!following.snapshot().is_stale);
    assert_eq!(backend.calls(method::GET_FOLLOWING), 2);
}
