//! `connect`: terminal client for Social Connect.
//!
//! Every subcommand goes through the same cached client the library
//! exposes, so `watch-thread` polls exactly like a chat window would.

mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use connect_actor::{HttpActor, HttpBlobStore};
use connect_client::SocialClient;
use connect_sync::TracingLogger;
use connect_types::Principal;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "connect", about = "Social Connect terminal client")]
struct Cli {
    /// Output format.
    #[arg(long, short = 'o', global = true, value_enum, default_value_t = Output::Table)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Output {
    Table,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show a profile (yours when no user is given).
    Profile { user: Option<Principal> },

    /// Create or replace your profile.
    Setup {
        #[arg(long)]
        username: String,
        #[arg(long = "display-name")]
        display_name: String,
        #[arg(long, default_value = "")]
        bio: String,
        /// Image file for the profile picture.
        #[arg(long)]
        picture: Option<PathBuf>,
    },

    /// List reels, newest first.
    Feed {
        #[arg(long)]
        author: Option<Principal>,
    },

    /// Live stories grouped by author.
    Stories,

    Followers { user: Option<Principal> },
    Following { user: Option<Principal> },
    Follow { user: Principal },
    Unfollow { user: Principal },

    /// Upload a video as a reel.
    PostReel {
        file: PathBuf,
        #[arg(long, default_value = "")]
        caption: String,
    },

    /// Upload an image as a story.
    PostStory { file: PathBuf },

    DeleteReel { id: String },
    DeleteStory { id: String },

    /// Print the conversation with a user.
    Thread { peer: Principal },

    /// Send a direct message.
    Send {
        peer: Principal,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Follow a conversation live until interrupted.
    WatchThread { peer: Principal },

    /// Show your role.
    Role,

    /// Assign a role to a user (admins only).
    Assign {
        user: Principal,
        role: connect_types::UserRole,
    },

    /// Run a scripted session against an in-memory backend.
    Demo,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "connect=info,connect_sync=info".into()),
        )
        .init();

    let cli = Cli::parse();

    if matches!(cli.command, Commands::Demo) {
        return commands::demo(cli.output).await;
    }

    let config = Config::from_env()?;
    let client = build_client(&config);
    info!(actor = %config.actor_url, principal = %config.principal, "connecting");

    commands::run(&client, cli.command, cli.output).await
}

fn build_client(config: &Config) -> SocialClient {
    let mut actor = HttpActor::new(&config.actor_url);
    let mut blobs = HttpBlobStore::new(&config.blob_url);
    if let Some(token) = &config.token {
        actor = actor.with_token(token);
        blobs = blobs.with_token(token);
    }

    let client = SocialClient::builder(Arc::new(blobs))
        .settings(config.sync.clone())
        .logger(Arc::new(TracingLogger))
        .build();
    client.connect(Arc::new(actor), config.principal.clone());
    client
}
