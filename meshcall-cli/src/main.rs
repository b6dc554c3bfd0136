mod console;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use console::{ConsoleView, Input, print_status};
use meshcall::client::{MeshConfig, SessionBuilder, SessionHandle, SyntheticCapture};
use meshcall::relay::{SignalingService, serve};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meshcall")]
#[command(about = "Mesh video rooms over a tiny signaling relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay.
    Relay {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
    /// Join a room from the terminal with synthetic media.
    Join {
        #[arg(long)]
        room: String,

        /// Overrides `relay_url` from the config.
        #[arg(long)]
        relay: Option<String>,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        config: Option<String>,
    },
    /// Print the default client configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Relay { bind } => run_relay(&bind).await,
        Commands::Join {
            room,
            relay,
            name,
            config,
        } => {
            let mut config = match config {
                Some(path) => MeshConfig::load(&path)?,
                None => MeshConfig::default(),
            };
            if let Some(url) = relay {
                config.relay_url = url;
            }
            let name = match name {
                Some(name) => name,
                None => prompt_name().await?,
            };
            run_join(config, room, name).await
        }
        Commands::Config => {
            print!("{}", MeshConfig::default().to_toml()?);
            Ok(())
        }
    }
}

async fn run_relay(bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind relay on {}", bind))?;
    println!("{}", "🚀 Relay is up".green().bold());
    serve(listener, SignalingService::new())
        .await
        .context("Relay stopped")
}

async fn prompt_name() -> Result<String> {
    tokio::task::spawn_blocking(|| {
        dialoguer::Input::<String>::new()
            .with_prompt("Display name")
            .interact_text()
    })
    .await?
    .context("Failed to read display name")
}

async fn run_join(config: MeshConfig, room: String, name: String) -> Result<()> {
    let capture = SyntheticCapture::new().with_media_pump(true);
    let (handle, task) = SessionBuilder::new(config)
        .with_capture(Arc::new(capture))
        .with_view(Arc::new(ConsoleView))
        .spawn();

    println!("{} {}", "📦 Joining".cyan(), room.as_str().bold());
    handle.join(room.as_str(), name.as_str()).await?;
    println!(
        "{}",
        "Type to chat. Commands: /video /audio /screen /status /leave".dimmed()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !apply(&handle, Input::parse(&line)).await {
                    break;
                }
            }
        }
    }

    handle.shutdown().await?;
    task.await?;
    println!("{}", "✨ Left the room".green().bold());
    Ok(())
}

/// Returns false once the user asked to leave.
async fn apply(handle: &SessionHandle, input: Input) -> bool {
    let outcome = match input {
        Input::Empty => Ok(()),
        Input::Leave => return false,
        Input::Video => handle
            .toggle_video()
            .await
            .map(|on| println!("video {}", if on { "on" } else { "off" })),
        Input::Audio => handle
            .toggle_audio()
            .await
            .map(|on| println!("audio {}", if on { "on" } else { "off" })),
        Input::Screen => handle
            .toggle_screen_share()
            .await
            .map(|on| println!("screen share {}", if on { "on" } else { "off" })),
        Input::Status => handle.snapshot().await.map(|s| print_status(&s)),
        Input::Chat(text) => handle.send_chat(text).await,
    };
    if let Err(e) = outcome {
        eprintln!("{} {}", "✗".red(), e);
    }
    true
}
