//! The async UDP driver.
//!
//! Owns the socket and the three wake-up sources the session suspends on:
//! inbound datagrams, the retransmission deadline, and user input. All
//! session mutation happens on this one task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::warn;

use pokeproto_battle::PokemonStatsRepository;

use crate::event::Event;
use crate::input::UserInput;
use crate::session::{PeerConfig, Session};

/// Consecutive send failures tolerated before the transport is declared dead.
const MAX_SEND_FAILURES: u32 = 5;

/// Sized past the single-MTU frames the protocol emits.
const RECV_BUFFER_SIZE: usize = 2048;

/// A bound peer, ready to run.
pub struct Peer {
    session: Session,
    socket: UdpSocket,
    inputs: mpsc::UnboundedReceiver<UserInput>,
    send_failures: u32,
}

/// Cloneable handle for feeding user input into a running peer.
#[derive(Clone)]
pub struct PeerHandle {
    inputs: mpsc::UnboundedSender<UserInput>,
}

impl PeerHandle {
    pub fn send(&self, input: UserInput) -> Result<()> {
        self.inputs
            .send(input)
            .map_err(|_| anyhow::anyhow!("peer has shut down"))
    }

    pub fn choose_move(&self, move_name: &str) -> Result<()> {
        self.send(UserInput::ChooseMove(move_name.to_string()))
    }

    pub fn send_chat(&self, content: pokeproto_protocol::ChatContent) -> Result<()> {
        self.send(UserInput::SendChat(content))
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(UserInput::Disconnect)
    }
}

impl Peer {
    /// Bind a UDP socket and build the session around it. Returns the peer,
    /// an input handle, and the display event stream.
    pub async fn bind(
        config: PeerConfig,
        repository: Arc<dyn PokemonStatsRepository>,
        bind_addr: &str,
    ) -> Result<(Self, PeerHandle, mpsc::UnboundedReceiver<Event>)> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .with_context(|| format!("failed to bind {bind_addr}"))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let session = Session::new(config, repository, event_tx)?;

        Ok((
            Self {
                session,
                socket,
                inputs: input_rx,
                send_failures: 0,
            },
            PeerHandle { inputs: input_tx },
            event_rx,
        ))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Initiate contact with a host (joiner and spectator roles).
    pub fn connect(&mut self, remote: SocketAddr) {
        self.session.initiate(remote, Instant::now());
    }

    /// Drive the session until it closes or the transport dies.
    pub async fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            self.flush().await?;
            if self.session.is_closed() {
                return Ok(());
            }

            let deadline = self.session.next_deadline();
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, from)) => {
                            self.session.on_datagram(&buf[..len], from, Instant::now());
                        }
                        Err(err) => warn!(%err, "recv failed"),
                    }
                }
                input = self.inputs.recv() => {
                    // A dropped handle counts as an explicit disconnect.
                    let input = input.unwrap_or(UserInput::Disconnect);
                    self.session.on_input(input, Instant::now());
                }
                _ = sleep_until_or_forever(deadline) => {
                    self.session.on_deadline(Instant::now());
                }
            }
        }
    }

    async fn flush(&mut self) -> Result<()> {
        for (bytes, dst) in self.session.take_outbox() {
            match self.socket.send_to(&bytes, dst).await {
                Ok(_) => self.send_failures = 0,
                Err(err) => {
                    self.send_failures += 1;
                    warn!(%err, %dst, failures = self.send_failures, "send failed");
                    if self.send_failures >= MAX_SEND_FAILURES {
                        bail!("transport dead: {} consecutive send failures", self.send_failures);
                    }
                }
            }
        }
        Ok(())
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
