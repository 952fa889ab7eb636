//! Host Demo
//!
//! Binds a UDP port and waits for a challenger, then plays a battle from
//! stdin. Type a move name on your turn, `/chat MESSAGE` to talk, `/quit`
//! to leave.
//!
//! Usage: host [BIND_ADDR] [POKEMON]

use std::sync::Arc;

use anyhow::Result;
use pokeproto_battle::{StatBoosts, StaticRepository};
use pokeproto_peer::{Event, Peer, PeerConfig, PeerHandle, Role};
use pokeproto_protocol::ChatContent;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let bind = args.next().unwrap_or_else(|| "0.0.0.0:7878".to_string());
    let pokemon = args.next().unwrap_or_else(|| "Charizard".to_string());

    let config = PeerConfig {
        peer_id: "HostUserA".to_string(),
        role: Role::Host,
        pokemon_name: pokemon.clone(),
        stat_boosts: StatBoosts::default(),
        verbose: false,
    };

    let (peer, handle, events) =
        Peer::bind(config, Arc::new(StaticRepository::new()), &bind).await?;
    println!("Hosting on {bind} with {pokemon}. Waiting for a challenger...");

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
            handle.choose_move(line)
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
            Event::BattleReady { local, opponent } => println!("{local} vs {opponent}!"),
            Event::TurnIndicator { turn, your_move } => {
                if your_move {
                    println!("=== Turn {turn} - your move! ===");
                } else {
                    println!("=== Turn {turn} - waiting for the opponent... ===");
                }
            }
            Event::HpUpdate {
                pokemon,
                current_hp,
                max_hp,
            } => println!("{pokemon}: {current_hp}/{max_hp} HP"),
            Event::Log(line) => println!("{line}"),
            Event::Chat { sender, content } => match content {
                ChatContent::Text(text) => println!("<{sender}> {text}"),
                ChatContent::Sticker(_) => println!("<{sender}> sent a sticker"),
            },
            Event::SpectatorJoined { peer_id } => println!("{peer_id} is watching"),
            Event::GameOver { winner, loser } => println!("{winner} defeated {loser}! GG."),
            Event::InputRejected(reason) => println!("(!) {reason}"),
            Event::Fatal(reason) => println!("connection lost: {reason}"),
        }
    }
}
