//! The session context: one peer's entire protocol state, hoisted into a
//! single struct, and the router that drives it.
//!
//! The session is synchronous. Datagrams, timer deadlines, and user input
//! come in through three entry points; outbound datagrams accumulate in the
//! outbox for the driver to flush. Turn handling lives in `turn.rs`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pokeproto_battle::{
    BattleError, BattleState, Combatant, Mulberry32, Phase, PokemonStatsRepository, StatBoosts,
};
use pokeproto_protocol::{parse_header, ChatContent, CommunicationMode, Message, MessageType, Packet};

use crate::connection::{ConnectionPhase, ConnectionState, Role};
use crate::event::Event;
use crate::input::UserInput;
use crate::reliability::{Reliability, RetryAction, MAX_RETRIES};

/// Static configuration for one session.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub peer_id: String,
    pub role: Role,
    pub pokemon_name: String,
    /// Boost allowances announced in our BATTLE_SETUP.
    pub stat_boosts: StatBoosts,
    /// Emit extra `Event::Log` lines for protocol internals.
    pub verbose: bool,
}

/// One peer's protocol state.
pub struct Session {
    pub(crate) config: PeerConfig,
    pub(crate) conn: ConnectionState,
    pub(crate) battle: BattleState,
    pub(crate) rng: Option<Mulberry32>,
    pub(crate) reliability: Reliability,
    pub(crate) repository: Arc<dyn PokemonStatsRepository>,
    pub(crate) events: mpsc::UnboundedSender<Event>,
    pub(crate) outbox: Vec<(Vec<u8>, SocketAddr)>,
    pub(crate) closed: bool,
}

impl Session {
    /// Build a session. Fails up front when the configured pokemon is not in
    /// the repository, so the error never reaches the wire.
    pub fn new(
        config: PeerConfig,
        repository: Arc<dyn PokemonStatsRepository>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Result<Self> {
        if config.role != Role::Spectator && repository.pokemon(&config.pokemon_name).is_none() {
            bail!(BattleError::UnknownPokemon(config.pokemon_name.clone()));
        }
        Ok(Self {
            conn: ConnectionState::new(config.role),
            battle: BattleState::new(),
            rng: None,
            reliability: Reliability::new(),
            repository,
            events,
            outbox: Vec::new(),
            closed: false,
            config,
        })
    }

    /// Initiate contact with a host. Joiners send HANDSHAKE_REQUEST,
    /// spectators SPECTATOR_REQUEST; a host has nothing to initiate.
    pub fn initiate(&mut self, remote: SocketAddr, now: Instant) {
        match self.config.role {
            Role::Joiner => {
                self.conn.peer_addr = Some(remote);
                let request = Message::HandshakeRequest {
                    peer_id: self.config.peer_id.clone(),
                    seed: None,
                    team_preview: vec![self.config.pokemon_name.clone()],
                };
                self.send_reliable(request, remote, None, now);
                self.conn.phase = ConnectionPhase::InitSent;
                self.emit(Event::Status(ConnectionPhase::InitSent));
            }
            Role::Spectator => {
                self.conn.peer_addr = Some(remote);
                let request = Message::SpectatorRequest {
                    peer_id: self.config.peer_id.clone(),
                };
                self.send_reliable(request, remote, None, now);
                self.conn.phase = ConnectionPhase::Spectating;
                self.emit(Event::Status(ConnectionPhase::Spectating));
            }
            Role::Host => {
                debug!("host has nothing to initiate; waiting for a handshake");
            }
        }
    }

    /// Service one inbound datagram to completion.
    pub fn on_datagram(&mut self, bytes: &[u8], from: SocketAddr, now: Instant) {
        if self.closed {
            return;
        }

        let header = match parse_header(bytes) {
            Ok(header) => header,
            Err(err) => {
                warn!(%from, %err, "dropping malformed frame");
                return;
            }
        };

        if header.message_type == MessageType::Ack {
            match header.ack_number {
                Some(n) => {
                    self.reliability.acknowledge(n);
                }
                None => warn!(%from, "ACK without ack_number"),
            }
            return;
        }

        // A piggybacked ack is consumed before the payload is interpreted.
        if let Some(n) = header.ack_number {
            self.reliability.acknowledge(n);
        }

        let Some(sequence) = header.sequence_number.filter(|s| *s > 0) else {
            warn!(%from, kind = %header.message_type, "reliable frame without sequence number");
            return;
        };

        // Every valid data frame is acknowledged, duplicates included; the
        // sender may be retransmitting because our earlier ACK was lost. The
        // one exception is a fresh handshake request, whose ack rides on the
        // HANDSHAKE_RESPONSE itself.
        let acked_by_response = header.message_type == MessageType::HandshakeRequest
            && self.config.role == Role::Host
            && self.conn.phase == ConnectionPhase::Disconnected;
        if !acked_by_response {
            self.send_ack(sequence, from);
        }

        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(%from, %err, "dropping invalid frame");
                return;
            }
        };

        if self.config.verbose {
            self.emit(Event::Log(format!("received {}", packet.message_type())));
        }
        self.handle_message(packet, from, now);
    }

    /// Service one user input.
    pub fn on_input(&mut self, input: UserInput, now: Instant) {
        if self.closed {
            return;
        }
        match input {
            UserInput::ChooseMove(move_name) => self.handle_choose_move(&move_name, now),
            UserInput::SendChat(content) => self.handle_send_chat(content, now),
            UserInput::Disconnect => self.handle_disconnect(),
        }
    }

    /// Service expired retransmission deadlines.
    pub fn on_deadline(&mut self, now: Instant) {
        if self.closed {
            return;
        }
        for action in self.reliability.on_deadline(now) {
            match action {
                RetryAction::Retransmit { bytes, dst, .. } => {
                    self.outbox.push((bytes, dst));
                }
                RetryAction::Exhausted { sequence } => {
                    self.emit(Event::Fatal(format!(
                        "no acknowledgment for packet {sequence} after {MAX_RETRIES} retries"
                    )));
                    self.close();
                }
            }
        }
    }

    /// Earliest pending retransmission deadline, for the driver's sleep.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.reliability.next_deadline()
    }

    /// Drain outbound datagrams accumulated since the last call.
    pub fn take_outbox(&mut self) -> Vec<(Vec<u8>, SocketAddr)> {
        std::mem::take(&mut self.outbox)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn handle_message(&mut self, packet: Packet, from: SocketAddr, now: Instant) {
        let sequence = packet.sequence;
        match packet.body {
            Message::HandshakeRequest { peer_id, .. } => {
                self.on_handshake_request(peer_id, sequence, from, now)
            }
            Message::HandshakeResponse { seed, peer_id, .. } => {
                self.on_handshake_response(seed, peer_id, from, now)
            }
            Message::SpectatorRequest { peer_id } => self.on_spectator_request(peer_id, from),
            Message::BattleSetup {
                pokemon_name,
                stat_boosts,
                communication_mode,
            } => self.on_battle_setup(pokemon_name, stat_boosts, communication_mode, from, now),
            Message::AttackAnnounce { move_name } => self.on_attack_announce(move_name, now),
            Message::DefenseAnnounce => self.on_defense_announce(now),
            Message::CalculationReport {
                remaining_health,
                damage_dealt,
                defender_hp_remaining,
                status_message,
                ..
            } => self.on_calculation_report(
                remaining_health,
                damage_dealt,
                defender_hp_remaining,
                status_message,
                now,
            ),
            Message::CalculationConfirm => self.on_calculation_confirm(now),
            Message::ResolutionRequest {
                damage_dealt,
                defender_hp_remaining,
                ..
            } => self.on_resolution_request(damage_dealt, defender_hp_remaining, now),
            Message::GameOver { winner, loser } => self.on_game_over(winner, loser),
            Message::ChatMessage {
                sender_name,
                content,
            } => self.emit(Event::Chat {
                sender: sender_name,
                content,
            }),
            Message::Ack => {
                // Routed before decode; unreachable for well-formed input.
            }
        }
    }

    // === Handshake and setup ===

    fn on_handshake_request(
        &mut self,
        peer_id: String,
        sequence: Option<u64>,
        from: SocketAddr,
        now: Instant,
    ) {
        if self.config.role != Role::Host {
            warn!(%from, "handshake request at a non-host peer");
            return;
        }
        if self.conn.phase != ConnectionPhase::Disconnected {
            warn!(%from, "duplicate handshake request");
            return;
        }

        self.conn.peer_addr = Some(from);
        self.conn.remote_peer_id = Some(peer_id);

        let seed: u32 = rand::random();
        self.battle.seed = seed;
        self.rng = Some(Mulberry32::new(seed));
        info!(seed, %from, "challenger connected, seed issued");

        let response = Message::HandshakeResponse {
            seed,
            peer_id: self.config.peer_id.clone(),
            team_preview: vec![self.config.pokemon_name.clone()],
            timestamp: unix_millis(),
        };
        self.send_reliable(response, from, sequence, now);

        self.conn.phase = ConnectionPhase::SetupExchanging;
        self.emit(Event::Status(ConnectionPhase::SetupExchanging));
        self.send_battle_setup(from, now);
    }

    fn on_handshake_response(
        &mut self,
        seed: u32,
        peer_id: String,
        from: SocketAddr,
        now: Instant,
    ) {
        if self.conn.phase != ConnectionPhase::InitSent {
            warn!(%from, "out-of-phase handshake response");
            return;
        }

        self.conn.remote_peer_id = Some(peer_id);
        self.battle.seed = seed;
        self.rng = Some(Mulberry32::new(seed));
        info!(seed, %from, "handshake complete");

        self.conn.phase = ConnectionPhase::SetupExchanging;
        self.emit(Event::Status(ConnectionPhase::SetupExchanging));
        self.send_battle_setup(from, now);
    }

    fn send_battle_setup(&mut self, dst: SocketAddr, now: Instant) {
        if self.conn.setup_sent {
            return;
        }
        let Some(data) = self.repository.pokemon(&self.config.pokemon_name) else {
            // Validated at construction; only a repository swap could land here.
            self.emit(Event::Fatal(format!(
                "unknown pokemon: {}",
                self.config.pokemon_name
            )));
            self.close();
            return;
        };
        self.battle.local = Some(Combatant::new(&data, self.config.stat_boosts));

        let setup = Message::BattleSetup {
            communication_mode: CommunicationMode::P2p,
            pokemon_name: data.name,
            stat_boosts: self.config.stat_boosts,
        };
        self.send_reliable(setup, dst, None, now);
        self.conn.setup_sent = true;
    }

    fn on_battle_setup(
        &mut self,
        pokemon_name: String,
        stat_boosts: StatBoosts,
        _mode: CommunicationMode,
        from: SocketAddr,
        now: Instant,
    ) {
        if self.conn.phase != ConnectionPhase::SetupExchanging {
            warn!(%from, "out-of-phase battle setup");
            return;
        }
        if self.battle.opponent.is_some() {
            warn!(%from, "duplicate battle setup");
            return;
        }

        let Some(data) = self.repository.pokemon(&pokemon_name) else {
            // Repositories disagree; no deterministic battle is possible.
            self.emit(Event::Fatal(format!(
                "opponent pokemon not in repository: {pokemon_name}"
            )));
            self.close();
            return;
        };
        self.battle.opponent = Some(Combatant::new(&data, stat_boosts));

        // The host replies with its own setup if it has not sent one yet.
        if !self.conn.setup_sent {
            self.send_battle_setup(from, now);
        }

        if let (Some(local), Some(opponent)) = (&self.battle.local, &self.battle.opponent) {
            let ready = Event::BattleReady {
                local: local.pokemon_name.clone(),
                opponent: opponent.pokemon_name.clone(),
            };
            self.conn.phase = ConnectionPhase::InBattle;
            self.battle.phase = Phase::WaitingForMove;
            self.emit(Event::Status(ConnectionPhase::InBattle));
            self.emit(ready);
            self.emit(Event::TurnIndicator {
                turn: self.battle.turn,
                your_move: self.config.role.attacks_on(self.battle.turn),
            });
        }
    }

    fn on_spectator_request(&mut self, peer_id: String, from: SocketAddr) {
        if !self.conn.spectators.contains(&from) {
            self.conn.spectators.push(from);
        }
        info!(%from, peer_id, "spectator registered");
        self.emit(Event::SpectatorJoined { peer_id });
    }

    fn on_game_over(&mut self, winner: String, loser: String) {
        // Honored in any phase: a desynchronized peer still terminates.
        if self.battle.phase == Phase::GameOver {
            debug!("game over already recorded locally");
            return;
        }
        self.battle.phase = Phase::GameOver;
        self.conn.phase = ConnectionPhase::GameOver;
        self.emit(Event::Status(ConnectionPhase::GameOver));
        self.emit(Event::GameOver { winner, loser });
    }

    // === User input ===

    fn handle_send_chat(&mut self, content: ChatContent, now: Instant) {
        let Some(dst) = self.conn.peer_addr else {
            self.emit(Event::InputRejected("not connected".to_string()));
            return;
        };
        let chat = Message::ChatMessage {
            sender_name: self.config.peer_id.clone(),
            content,
        };
        self.send_reliable(chat, dst, None, now);
    }

    fn handle_disconnect(&mut self) {
        // No notification to the remote; its reliability layer escalates on
        // its own.
        self.close();
    }

    // === Plumbing ===

    pub(crate) fn send_reliable(
        &mut self,
        body: Message,
        dst: SocketAddr,
        ack: Option<u64>,
        now: Instant,
    ) {
        let sequence = self.reliability.next_sequence();
        let packet = Packet {
            sequence: Some(sequence),
            ack,
            body,
        };
        if self.config.verbose {
            self.emit(Event::Log(format!(
                "sending {} (seq {sequence})",
                packet.message_type()
            )));
        }
        let bytes = packet.encode().into_bytes();
        self.outbox.push((bytes.clone(), dst));
        self.reliability.register(sequence, bytes, dst, now);
    }

    fn send_ack(&mut self, sequence: u64, dst: SocketAddr) {
        let bytes = Packet::ack(sequence).encode().into_bytes();
        self.outbox.push((bytes, dst));
    }

    pub(crate) fn close(&mut self) {
        self.reliability.clear();
        self.closed = true;
        self.conn.phase = ConnectionPhase::Closed;
        self.emit(Event::Status(ConnectionPhase::Closed));
    }

    pub(crate) fn emit(&self, event: Event) {
        // The consumer may have gone away during shutdown; nothing to do.
        let _ = self.events.send(event);
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
