#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use tokio::sync::mpsc;

    use pokeproto_battle::{Phase, StatBoosts, StaticRepository};
    use pokeproto_protocol::{parse_header, ChatContent, Message, MessageType, Packet};

    use crate::connection::{ConnectionPhase, Role};
    use crate::event::Event;
    use crate::input::UserInput;
    use crate::reliability::{MAX_RETRIES, TIMEOUT_MS};
    use crate::session::{PeerConfig, Session};

    fn host_addr() -> SocketAddr {
        "127.0.0.1:7001".parse().unwrap()
    }

    fn joiner_addr() -> SocketAddr {
        "127.0.0.1:7002".parse().unwrap()
    }

    fn now() -> Instant {
        Instant::now()
    }

    fn session(role: Role, pokemon: &str) -> (Session, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = PeerConfig {
            peer_id: format!("{role}-peer"),
            role,
            pokemon_name: pokemon.to_string(),
            stat_boosts: StatBoosts::default(),
            verbose: false,
        };
        let session = Session::new(config, Arc::new(StaticRepository::new()), tx).unwrap();
        (session, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Reliable frames carry a sequence number; ACKs never do.
    fn assert_frame_invariants(bytes: &[u8]) {
        let header = parse_header(bytes).unwrap();
        if header.message_type == MessageType::Ack {
            assert!(header.sequence_number.is_none(), "ACK with sequence number");
            assert!(header.ack_number.is_some(), "ACK without ack number");
        } else {
            assert!(
                header.sequence_number.is_some(),
                "reliable {} without sequence number",
                header.message_type
            );
        }
    }

    struct Harness {
        host: Session,
        host_events: mpsc::UnboundedReceiver<Event>,
        joiner: Session,
        joiner_events: mpsc::UnboundedReceiver<Event>,
    }

    impl Harness {
        fn new(host_pokemon: &str, joiner_pokemon: &str) -> Self {
            let (host, host_events) = session(Role::Host, host_pokemon);
            let (joiner, joiner_events) = session(Role::Joiner, joiner_pokemon);
            Self {
                host,
                host_events,
                joiner,
                joiner_events,
            }
        }

        /// Shuttle datagrams both ways until both outboxes drain. Returns
        /// every frame that crossed the wire, tagged with its sender.
        fn pump(&mut self) -> Vec<(&'static str, Vec<u8>)> {
            let mut transferred = Vec::new();
            loop {
                let host_out = self.host.take_outbox();
                let joiner_out = self.joiner.take_outbox();
                if host_out.is_empty() && joiner_out.is_empty() {
                    break;
                }
                for (bytes, dst) in host_out {
                    assert_frame_invariants(&bytes);
                    assert_eq!(dst, joiner_addr());
                    self.joiner.on_datagram(&bytes, host_addr(), now());
                    transferred.push(("host", bytes));
                }
                for (bytes, dst) in joiner_out {
                    assert_frame_invariants(&bytes);
                    assert_eq!(dst, host_addr());
                    self.host.on_datagram(&bytes, joiner_addr(), now());
                    transferred.push(("joiner", bytes));
                }
            }
            transferred
        }

        /// Handshake and setup, to the point where turn 1 may start.
        fn connect(&mut self) -> Vec<(&'static str, Vec<u8>)> {
            self.joiner.initiate(host_addr(), now());
            let transferred = self.pump();
            assert_eq!(self.host.conn.phase, ConnectionPhase::InBattle);
            assert_eq!(self.joiner.conn.phase, ConnectionPhase::InBattle);
            transferred
        }

        /// Play one full turn with the given move for whoever's turn it is.
        fn play_turn(&mut self, move_name: &str) {
            let turn = self.host.battle.turn;
            if Role::Host.attacks_on(turn) {
                self.host
                    .on_input(UserInput::ChooseMove(move_name.to_string()), now());
            } else {
                self.joiner
                    .on_input(UserInput::ChooseMove(move_name.to_string()), now());
            }
            self.pump();
        }

        fn assert_converged(&self) {
            assert_eq!(self.host.battle.turn, self.joiner.battle.turn);
            let host_local = self.host.battle.local.as_ref().unwrap();
            let host_opp = self.host.battle.opponent.as_ref().unwrap();
            let joiner_local = self.joiner.battle.local.as_ref().unwrap();
            let joiner_opp = self.joiner.battle.opponent.as_ref().unwrap();
            assert_eq!(host_local.current_hp, joiner_opp.current_hp);
            assert_eq!(host_opp.current_hp, joiner_local.current_hp);
        }
    }

    fn tamper_report(bytes: &[u8], delta: u32) -> Vec<u8> {
        let mut packet = Packet::decode(bytes).unwrap();
        match &mut packet.body {
            Message::CalculationReport {
                damage_dealt,
                defender_hp_remaining,
                ..
            } => {
                *damage_dealt += delta;
                *defender_hp_remaining = defender_hp_remaining.saturating_sub(delta);
            }
            other => panic!("not a calculation report: {:?}", other.message_type()),
        }
        packet.encode().into_bytes()
    }

    // === Handshake and setup ===

    #[test]
    fn handshake_reaches_battle_with_shared_seed() {
        let mut h = Harness::new("Charizard", "Blastoise");
        h.connect();

        assert_eq!(h.host.battle.phase, Phase::WaitingForMove);
        assert_eq!(h.joiner.battle.phase, Phase::WaitingForMove);
        assert_eq!(h.host.battle.seed, h.joiner.battle.seed);
        assert_eq!(h.host.rng, h.joiner.rng);

        // Every reliable frame was acknowledged along the way.
        assert!(h.host.reliability.is_empty());
        assert!(h.joiner.reliability.is_empty());

        let host_events = drain(&mut h.host_events);
        assert!(host_events.contains(&Event::TurnIndicator {
            turn: 1,
            your_move: true
        }));
        let joiner_events = drain(&mut h.joiner_events);
        assert!(joiner_events.contains(&Event::TurnIndicator {
            turn: 1,
            your_move: false
        }));
        assert!(joiner_events.iter().any(|e| matches!(
            e,
            Event::BattleReady { local, opponent }
                if local == "Blastoise" && opponent == "Charizard"
        )));
    }

    #[test]
    fn sequence_numbers_are_contiguous_from_one() {
        let mut h = Harness::new("Charizard", "Blastoise");
        let mut transferred = h.connect();
        h.play_turn("Flamethrower");
        transferred.extend(h.pump());

        for sender in ["host", "joiner"] {
            let sequences: Vec<u64> = transferred
                .iter()
                .filter(|(s, _)| *s == sender)
                .filter_map(|(_, bytes)| parse_header(bytes).unwrap().sequence_number)
                .collect();
            let expected: Vec<u64> = (1..=sequences.len() as u64).collect();
            assert_eq!(sequences, expected, "{sender} sequence numbers");
        }
    }

    #[test]
    fn out_of_phase_handshake_response_is_ignored() {
        let (mut host, _events) = session(Role::Host, "Charizard");
        let stray = Packet {
            sequence: Some(1),
            ack: None,
            body: Message::HandshakeResponse {
                seed: 4242,
                peer_id: "nobody".to_string(),
                team_preview: vec!["Gengar".to_string()],
                timestamp: 0,
            },
        };
        host.on_datagram(stray.encode().as_bytes(), joiner_addr(), now());

        assert_eq!(host.conn.phase, ConnectionPhase::Disconnected);
        assert_eq!(host.battle.seed, 0);
        // The frame is still acknowledged so the sender stops retransmitting.
        let out = host.take_outbox();
        assert_eq!(out.len(), 1);
        let header = parse_header(&out[0].0).unwrap();
        assert_eq!(header.message_type, MessageType::Ack);
        assert_eq!(header.ack_number, Some(1));
    }

    #[test]
    fn spectator_request_is_registered_and_acked() {
        let (mut host, mut events) = session(Role::Host, "Charizard");
        let request = Packet {
            sequence: Some(1),
            ack: None,
            body: Message::SpectatorRequest {
                peer_id: "watcher".to_string(),
            },
        };
        let spectator: SocketAddr = "127.0.0.1:7050".parse().unwrap();
        host.on_datagram(request.encode().as_bytes(), spectator, now());

        assert_eq!(host.conn.spectators, vec![spectator]);
        assert!(drain(&mut events).contains(&Event::SpectatorJoined {
            peer_id: "watcher".to_string()
        }));
    }

    // === Turns ===

    #[test]
    fn happy_turn_converges_on_both_peers() {
        let mut h = Harness::new("Charizard", "Blastoise");
        h.connect();
        drain(&mut h.host_events);
        drain(&mut h.joiner_events);

        h.play_turn("Flamethrower");

        assert_eq!(h.host.battle.turn, 2);
        h.assert_converged();
        assert_eq!(h.host.battle.phase, Phase::WaitingForMove);
        assert_eq!(h.joiner.battle.phase, Phase::WaitingForMove);

        // Damage landed on the joiner's side.
        let blastoise = h.joiner.battle.local.as_ref().unwrap();
        assert!(blastoise.current_hp < blastoise.max_hp());

        // Both sides surfaced the same authoritative HP update.
        let hp_of = |events: &[Event]| {
            events.iter().find_map(|e| match e {
                Event::HpUpdate {
                    pokemon,
                    current_hp,
                    ..
                } if pokemon == "Blastoise" => Some(*current_hp),
                _ => None,
            })
        };
        let host_events = drain(&mut h.host_events);
        let joiner_events = drain(&mut h.joiner_events);
        assert_eq!(hp_of(&host_events), hp_of(&joiner_events));
        assert!(host_events.contains(&Event::TurnIndicator {
            turn: 2,
            your_move: false
        }));

        // All acknowledged; nothing left to retransmit.
        assert!(h.host.reliability.is_empty());
        assert!(h.joiner.reliability.is_empty());
    }

    #[test]
    fn turns_alternate_between_peers() {
        let mut h = Harness::new("Snorlax", "Blastoise");
        h.connect();

        h.play_turn("Tackle");
        assert_eq!(h.host.battle.turn, 2);
        h.play_turn("Water Gun");
        assert_eq!(h.host.battle.turn, 3);
        h.assert_converged();
    }

    #[test]
    fn choose_move_off_turn_is_rejected_without_packets() {
        let mut h = Harness::new("Charizard", "Blastoise");
        h.connect();
        drain(&mut h.joiner_events);

        // Turn 1 belongs to the host.
        h.joiner
            .on_input(UserInput::ChooseMove("Surf".to_string()), now());

        assert!(h.joiner.take_outbox().is_empty());
        assert!(drain(&mut h.joiner_events)
            .iter()
            .any(|e| matches!(e, Event::InputRejected(_))));
        assert_eq!(h.joiner.battle.phase, Phase::WaitingForMove);
    }

    #[test]
    fn unknown_move_is_surfaced_to_the_user_only() {
        let mut h = Harness::new("Charizard", "Blastoise");
        h.connect();
        drain(&mut h.host_events);

        h.host
            .on_input(UserInput::ChooseMove("Splash".to_string()), now());

        assert!(h.host.take_outbox().is_empty());
        let events = drain(&mut h.host_events);
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::InputRejected(reason) if reason.contains("Splash"))));
    }

    #[test]
    fn duplicate_data_frame_is_reacked_and_dropped() {
        let mut h = Harness::new("Charizard", "Blastoise");
        let transferred = h.connect();

        // Replay the joiner's BATTLE_SETUP at the host.
        let (_, setup) = transferred
            .iter()
            .find(|(sender, bytes)| {
                *sender == "joiner"
                    && parse_header(bytes).unwrap().message_type == MessageType::BattleSetup
            })
            .unwrap();
        let setup_seq = parse_header(setup).unwrap().sequence_number.unwrap();

        h.host.on_datagram(setup, joiner_addr(), now());

        let out = h.host.take_outbox();
        assert_eq!(out.len(), 1, "exactly one ACK, no state change");
        let header = parse_header(&out[0].0).unwrap();
        assert_eq!(header.message_type, MessageType::Ack);
        assert_eq!(header.ack_number, Some(setup_seq));
        assert_eq!(h.host.conn.phase, ConnectionPhase::InBattle);
        assert_eq!(h.host.battle.phase, Phase::WaitingForMove);
    }

    #[test]
    fn duplicate_ack_is_a_noop() {
        let mut h = Harness::new("Charizard", "Blastoise");
        h.connect();

        let ack = Packet::ack(1).encode().into_bytes();
        h.host.on_datagram(&ack, joiner_addr(), now());
        h.host.on_datagram(&ack, joiner_addr(), now());

        assert!(h.host.take_outbox().is_empty());
        assert_eq!(h.host.conn.phase, ConnectionPhase::InBattle);
    }

    // === Mismatch resolution ===

    #[test]
    fn mismatch_adopts_the_requester_values() {
        let mut h = Harness::new("Charizard", "Blastoise");
        h.connect();

        h.host
            .on_input(UserInput::ChooseMove("Flamethrower".to_string()), now());
        for (bytes, _) in h.host.take_outbox() {
            h.joiner.on_datagram(&bytes, host_addr(), now());
        }

        // Corrupt the joiner's report in flight; the host must detect the
        // mismatch and propose its own values.
        for (bytes, _) in h.joiner.take_outbox() {
            let header = parse_header(&bytes).unwrap();
            let bytes = if header.message_type == MessageType::CalculationReport {
                tamper_report(&bytes, 1)
            } else {
                bytes
            };
            h.host.on_datagram(&bytes, joiner_addr(), now());
        }

        let mut resolution_sent = false;
        for (bytes, _) in h.host.take_outbox() {
            let header = parse_header(&bytes).unwrap();
            resolution_sent |= header.message_type == MessageType::ResolutionRequest;
            h.joiner.on_datagram(&bytes, host_addr(), now());
        }
        assert!(resolution_sent, "host proposed its values");

        h.pump();

        assert_eq!(h.host.battle.turn, 2);
        assert_eq!(h.joiner.battle.turn, 2);
        h.assert_converged();
    }

    #[test]
    fn crossed_resolution_requests_host_wins() {
        let mut h = Harness::new("Charizard", "Blastoise");
        h.connect();

        h.host
            .on_input(UserInput::ChooseMove("Flamethrower".to_string()), now());
        for (bytes, _) in h.host.take_outbox() {
            h.joiner.on_datagram(&bytes, host_addr(), now());
        }

        // Hold both reports back, deliver everything else.
        let mut joiner_report = None;
        for (bytes, _) in h.joiner.take_outbox() {
            if parse_header(&bytes).unwrap().message_type == MessageType::CalculationReport {
                joiner_report = Some(bytes);
            } else {
                h.host.on_datagram(&bytes, joiner_addr(), now());
            }
        }
        let mut host_report = None;
        for (bytes, _) in h.host.take_outbox() {
            if parse_header(&bytes).unwrap().message_type == MessageType::CalculationReport {
                host_report = Some(bytes);
            } else {
                h.joiner.on_datagram(&bytes, host_addr(), now());
            }
        }
        let host_report = host_report.expect("host reported");
        let joiner_report = joiner_report.expect("joiner reported");

        // The agreed outcome is whatever the host computed locally.
        let expected_hp = match Packet::decode(&host_report).unwrap().body {
            Message::CalculationReport {
                defender_hp_remaining,
                ..
            } => defender_hp_remaining,
            _ => unreachable!(),
        };

        // Corrupt both reports so each peer sees a mismatch and requests
        // resolution simultaneously.
        h.host
            .on_datagram(&tamper_report(&joiner_report, 2), joiner_addr(), now());
        h.joiner
            .on_datagram(&tamper_report(&host_report, 2), host_addr(), now());

        // Joiner's request reaches the host first; the host must ignore it.
        for (bytes, _) in h.joiner.take_outbox() {
            h.host.on_datagram(&bytes, joiner_addr(), now());
        }
        for (bytes, _) in h.host.take_outbox() {
            h.joiner.on_datagram(&bytes, host_addr(), now());
        }
        h.pump();

        assert_eq!(h.host.battle.turn, 2);
        assert_eq!(h.joiner.battle.turn, 2);
        h.assert_converged();
        assert_eq!(
            h.joiner.battle.local.as_ref().unwrap().current_hp,
            expected_hp,
            "host values stood"
        );
    }

    // === Game over ===

    #[test]
    fn lethal_turn_ends_the_game_on_both_peers() {
        let mut h = Harness::new("Charizard", "Blastoise");
        h.connect();

        for _ in 0..100 {
            if h.host.battle.phase == Phase::GameOver {
                break;
            }
            let move_name = if Role::Host.attacks_on(h.host.battle.turn) {
                "Flamethrower"
            } else {
                "Hydro Pump"
            };
            h.play_turn(move_name);
        }

        assert_eq!(h.host.battle.phase, Phase::GameOver);
        assert_eq!(h.joiner.battle.phase, Phase::GameOver);
        assert_eq!(h.host.conn.phase, ConnectionPhase::GameOver);
        assert_eq!(h.joiner.conn.phase, ConnectionPhase::GameOver);
        h.assert_converged();

        // Exactly one side fainted, seen identically from both peers.
        let host_local_hp = h.host.battle.local.as_ref().unwrap().current_hp;
        let host_opp_hp = h.host.battle.opponent.as_ref().unwrap().current_hp;
        assert!(host_local_hp == 0 || host_opp_hp == 0);
        assert!(host_local_hp != host_opp_hp);

        let winner_of = |events: &[Event]| {
            events.iter().find_map(|e| match e {
                Event::GameOver { winner, .. } => Some(winner.clone()),
                _ => None,
            })
        };
        let host_winner = winner_of(&drain(&mut h.host_events)).expect("host saw game over");
        let joiner_winner = winner_of(&drain(&mut h.joiner_events)).expect("joiner saw game over");
        assert_eq!(host_winner, joiner_winner);
    }

    // === Chat ===

    #[test]
    fn chat_bypasses_the_turn_machine() {
        let mut h = Harness::new("Charizard", "Blastoise");
        h.connect();

        // Open a turn, then chat mid-exchange.
        h.host
            .on_input(UserInput::ChooseMove("Flamethrower".to_string()), now());
        h.joiner.on_input(
            UserInput::SendChat(ChatContent::Text("gl hf".to_string())),
            now(),
        );
        h.pump();

        let events = drain(&mut h.host_events);
        assert!(events.contains(&Event::Chat {
            sender: "JOINER-peer".to_string(),
            content: ChatContent::Text("gl hf".to_string()),
        }));
        // The turn still completed normally around the chat.
        assert_eq!(h.host.battle.turn, 2);
        h.assert_converged();
    }

    // === Reliability failure and teardown ===

    #[test]
    fn unacknowledged_handshake_escalates_to_fatal() {
        let (mut joiner, mut events) = session(Role::Joiner, "Blastoise");
        let t0 = now();
        joiner.initiate(host_addr(), t0);
        let original = joiner.take_outbox();
        assert_eq!(original.len(), 1);

        // Retransmissions at 500, 1000, 1500 ms, byte-identical.
        for attempt in 1..=MAX_RETRIES {
            joiner.on_deadline(t0 + Duration::from_millis(TIMEOUT_MS * u64::from(attempt)));
            let retransmits = joiner.take_outbox();
            assert_eq!(retransmits.len(), 1, "attempt {attempt}");
            assert_eq!(retransmits[0].0, original[0].0);
        }

        // Fourth deadline: fatal, session closed, nothing further sent.
        joiner.on_deadline(t0 + Duration::from_millis(TIMEOUT_MS * 4));
        assert!(joiner.is_closed());
        assert!(joiner.take_outbox().is_empty());
        assert!(joiner.reliability.is_empty());
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, Event::Fatal(_))));
    }

    #[test]
    fn disconnect_input_closes_the_session() {
        let mut h = Harness::new("Charizard", "Blastoise");
        h.connect();

        h.joiner.on_input(UserInput::Disconnect, now());
        assert!(h.joiner.is_closed());
        assert!(h.joiner.reliability.is_empty());
        assert!(drain(&mut h.joiner_events).contains(&Event::Status(ConnectionPhase::Closed)));

        // A closed session emits nothing further.
        h.joiner
            .on_input(UserInput::ChooseMove("Surf".to_string()), now());
        assert!(h.joiner.take_outbox().is_empty());
    }

    #[test]
    fn unknown_local_pokemon_fails_at_construction() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = PeerConfig {
            peer_id: "host".to_string(),
            role: Role::Host,
            pokemon_name: "MissingNo".to_string(),
            stat_boosts: StatBoosts::default(),
            verbose: false,
        };
        assert!(Session::new(config, Arc::new(StaticRepository::new()), tx).is_err());
    }
}
