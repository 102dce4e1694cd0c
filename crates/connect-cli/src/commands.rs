use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;

use connect_actor::{MemoryBackend, MemoryBlobStore};
use connect_client::{Media, ProfileDraft, ProgressFn, SocialClient};
use connect_sync::{MutationOutcome, TracingLogger};
use connect_types::{Message, Principal, Reel, UserProfile};

use crate::{Commands, Output};

pub async fn run(client: &SocialClient, command: Commands, output: Output) -> anyhow::Result<()> {
    match command {
        Commands::Profile { user } => {
            let profile = match user {
                Some(user) => client.user_profile(&user).await?,
                None => client.caller_profile().await?,
            };
            match profile.as_ref() {
                Some(p) => emit(output, p, print_profile)?,
                None => println!("no profile"),
            }
        }
        Commands::Setup {
            username,
            display_name,
            bio,
            picture,
        } => {
            let mut draft = ProfileDraft::new(username, display_name).bio(bio);
            if let Some(path) = picture {
                draft = draft.picture(read_media(&path).await?);
            }
            report(client.save_caller_profile(draft, Some(progress_bar())).await?);
        }
        Commands::Feed { author } => {
            let reels = match author {
                Some(author) => client.reels_by_author(&author).await?,
                None => client.reels().await?.to_vec(),
            };
            emit(output, &reels, |r| r.iter().for_each(print_reel))?;
        }
        Commands::Stories => {
            let groups = client.story_groups().await?;
            if groups.is_empty() {
                println!("no live stories");
            }
            for story in &groups.own {
                println!("you       {}  expires {}", story.id, story.expires_at.format("%H:%M"));
            }
            for (author, stories) in &groups.others {
                println!("{:<9} {} stor{}", author, stories.len(), if stories.len() == 1 { "y" } else { "ies" });
            }
        }
        Commands::Followers { user } => {
            let user = user_or_me(client, user)?;
            emit(output, &*client.followers(&user).await?, |l| print_principals(l))?;
        }
        Commands::Following { user } => {
            let user = user_or_me(client, user)?;
            emit(output, &*client.following(&user).await?, |l| print_principals(l))?;
        }
        Commands::Follow { user } => report(client.follow(&user).await?),
        Commands::Unfollow { user } => report(client.unfollow(&user).await?),
        Commands::PostReel { file, caption } => {
            let media = read_media(&file).await?;
            report(client.add_reel(media, &caption, Some(progress_bar())).await?);
        }
        Commands::PostStory { file } => {
            let media = read_media(&file).await?;
            report(client.add_story(media, Some(progress_bar())).await?);
        }
        Commands::DeleteReel { id } => report(client.delete_reel(&id).await?),
        Commands::DeleteStory { id } => report(client.delete_story(&id).await?),
        Commands::Thread { peer } => {
            let thread = client.messages(&peer).await?;
            emit(output, &*thread, |t| t.iter().for_each(print_message))?;
        }
        Commands::Send { peer, text } => report(client.send_message(&peer, &text.join(" ")).await?),
        Commands::WatchThread { peer } => watch_thread(client, &peer).await?,
        Commands::Role => {
            let role = client.caller_role().await?;
            println!("{}{}", role, if client.is_caller_admin().await? { " (admin)" } else { "" });
        }
        Commands::Assign { user, role } => report(client.assign_role(&user, role).await?),
        Commands::Demo => demo(output).await?,
    }
    Ok(())
}

/// Print new messages as the thread's poll picks them up.
async fn watch_thread(client: &SocialClient, peer: &Principal) -> anyhow::Result<()> {
    let mut thread = client.watch_messages(peer)?;
    let mut shown = 0;
    println!("watching conversation with {} (ctrl-c to stop)", peer);

    loop {
        tokio::select! {
            event = thread.changed() => {
                if event.is_none() {
                    break;
                }
                let snap = thread.snapshot();
                if let Some(messages) = snap.data {
                    messages.iter().skip(shown).for_each(print_message);
                    shown = messages.len();
                }
                if let Some(err) = snap.error {
                    eprintln!("! {}", err);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

/// Seed an in-memory backend and walk through the main flows.
pub async fn demo(output: Output) -> anyhow::Result<()> {
    let backend = MemoryBackend::new();
    let me: Principal = "alice".parse()?;
    let bob: Principal = "bob".parse()?;

    backend.insert_profile(
        bob.clone(),
        UserProfile {
            username: "bob".into(),
            display_name: "Bob".into(),
            bio: "films things".into(),
            profile_picture: connect_types::BlobHandle::from_url("mem://avatars/bob"),
            follower_count: 0,
            following_count: 0,
        },
    );
    backend.insert_message(Message {
        text: "hey, welcome!".into(),
        sender: bob.clone(),
        recipient: me.clone(),
        timestamp: Utc::now(),
    });

    let client = SocialClient::builder(Arc::new(MemoryBlobStore::new()))
        .logger(Arc::new(TracingLogger))
        .build();
    client.connect(Arc::new(backend.actor_for(me.clone())), me.clone());

    if client.needs_profile_setup().await? {
        println!("== setting up profile");
        report(
            client
                .save_caller_profile(ProfileDraft::new("alice", "Alice").bio("hello"), None)
                .await?,
        );
    }

    println!("== following bob");
    report(client.follow(&bob).await?);
    let bob_profile = client.user_profile(&bob).await?;
    if let Some(p) = bob_profile.as_ref() {
        emit(output, p, print_profile)?;
    }

    println!("== posting a reel");
    let clip = Media::new("video/mp4", vec![0u8; 512 * 1024]);
    report(client.add_reel(clip, "  first clip  ", Some(progress_bar())).await?);
    emit(output, &*client.reels().await?, |r| r.iter().for_each(print_reel))?;

    println!("== messaging bob");
    let thread = client.watch_messages(&bob)?;
    report(client.send_message(&bob, "thanks!").await?);
    tokio::time::sleep(Duration::from_millis(50)).await;
    if let Some(messages) = thread.data() {
        messages.iter().for_each(print_message);
    }
    println!("conversations: {:?}", client.conversations());

    println!("== calls made: {}", backend.total_calls());
    Ok(())
}

fn user_or_me(client: &SocialClient, user: Option<Principal>) -> anyhow::Result<Principal> {
    user.or_else(|| client.me()).context("no identity configured")
}

fn emit<T: Serialize + ?Sized>(output: Output, value: &T, table: impl FnOnce(&T)) -> anyhow::Result<()> {
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Output::Table => table(value),
    }
    Ok(())
}

fn report<T>(outcome: MutationOutcome<T>) {
    match outcome {
        MutationOutcome::Completed(_) => println!("done"),
        MutationOutcome::AlreadyPending => println!("already in progress"),
    }
}

fn progress_bar() -> ProgressFn {
    Arc::new(|pct| {
        if pct % 25 == 0 {
            eprintln!("upload {:>3}%", pct);
        }
    })
}

async fn read_media(path: &Path) -> anyhow::Result<Media> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(Media::new(content_type_for(path), bytes))
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn print_profile(p: &UserProfile) {
    println!("{} (@{})", p.display_name, p.username);
    if !p.bio.is_empty() {
        println!("  {}", p.bio);
    }
    println!("  {} followers, {} following", p.follower_count, p.following_count);
}

fn print_reel(r: &Reel) {
    println!(
        "{}  {:<12} {}  {}",
        r.timestamp.format("%Y-%m-%d %H:%M"),
        r.author,
        r.id,
        r.caption
    );
}

fn print_message(m: &Message) {
    println!("[{}] {}: {}", m.timestamp.format("%H:%M:%S"), m.sender, m.text);
}

fn print_principals(list: &[Principal]) {
    if list.is_empty() {
        println!("(none)");
    }
    list.iter().for_each(|p| println!("{}", p));
}
