//! Spectator Demo
//!
//! Registers as an observer with a host and prints whatever arrives (chat,
//! battle events where forwarded). `/chat MESSAGE` to talk, `/quit` to leave.
//!
//! Usage: spectate HOST_ADDR

use std::sync::Arc;

use anyhow::{Context, Result};
use pokeproto_battle::{StatBoosts, StaticRepository};
use pokeproto_peer::{Event, Peer, PeerConfig, PeerHandle, Role};
use pokeproto_protocol::ChatContent;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let remote = args
        .next()
        .context("usage: spectate HOST_ADDR")?
        .parse()
        .context("HOST_ADDR must be ip:port")?;

    let config = PeerConfig {
        peer_id: "Spectator".to_string(),
        role: Role::Spectator,
        pokemon_name: String::new(),
        stat_boosts: StatBoosts::default(),
        verbose: false,
    };

    let (mut peer, handle, events) =
        Peer::bind(config, Arc::new(StaticRepository::new()), "0.0.0.0:0").await?;
    println!("Watching the battle at {remote}...");
    peer.connect(remote);

    tokio::spawn(print_events(events));
    tokio::spawn(read_stdin(handle));

    peer.run().await
}

async fn read_stdin(handle: PeerHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let result = if let Some(text) = line.strip_prefix("/chat ") {
            handle.send_chat(ChatContent::Text(text.to_string()))
        } else if line == "/quit" {
            let _ = handle.disconnect();
            break;
        } else {
            continue;
        };
        if result.is_err() {
            break;
        }
    }
}

async fn print_events(mut events: tokio::sync::mpsc::UnboundedReceiver<Event>) {
    while let Some(event) = events.recv().await {
        match event {
            Event::Status(phase) => println!("[status] {phase:?}"),
            Event::Chat { sender, content } => match content {
                ChatContent::Text(text) => println!("<{sender}> {text}"),
                ChatContent::Sticker(_) => println!("<{sender}> sent a sticker"),
            },
            Event::GameOver { winner, loser } => println!("{winner} defeated {loser}!"),
            Event::Fatal(reason) => println!("connection lost: {reason}"),
            other => println!("{other:?}"),
        }
    }
}
