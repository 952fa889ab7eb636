//! The turn state machine: the ATTACK/DEFENSE/REPORT/CONFIRM/RESOLUTION
//! exchange that mutates battle state exactly once per turn.
//!
//! Both peers run the calculator independently and compare results. A turn
//! completes when this peer has both sent and received CALCULATION_CONFIRM,
//! or when a RESOLUTION_REQUEST settles a mismatch. When both peers detect
//! the mismatch and their requests cross, the host's values stand.

use std::time::Instant;

use tracing::warn;

use pokeproto_battle::{compute_damage, MoveCategory, PendingTurn, Phase, TurnReport};
use pokeproto_protocol::Message;

use crate::connection::{ConnectionPhase, Role};
use crate::event::Event;
use crate::session::Session;

impl Session {
    /// Local user chose a move; open the turn as attacker.
    pub(crate) fn handle_choose_move(&mut self, move_name: &str, now: Instant) {
        if self.battle.phase != Phase::WaitingForMove {
            self.emit(Event::InputRejected(
                "no move can be chosen right now".to_string(),
            ));
            return;
        }
        if !self.config.role.attacks_on(self.battle.turn) {
            self.emit(Event::InputRejected("it is not your turn".to_string()));
            return;
        }
        let Some(mv) = self.repository.move_data(move_name) else {
            self.emit(Event::InputRejected(format!("unknown move: {move_name}")));
            return;
        };
        let Some(dst) = self.conn.peer_addr else {
            self.emit(Event::InputRejected("not connected".to_string()));
            return;
        };

        let attacker_name = self
            .battle
            .local
            .as_ref()
            .map(|c| c.pokemon_name.clone())
            .unwrap_or_default();
        self.battle.pending = Some(PendingTurn::new(true, attacker_name, mv.name.clone()));
        self.battle.phase = Phase::ProcessingTurn;
        self.send_reliable(Message::AttackAnnounce { move_name: mv.name }, dst, None, now);
    }

    /// Opponent opened the turn; we are the defender.
    pub(crate) fn on_attack_announce(&mut self, move_name: String, now: Instant) {
        if self.battle.phase != Phase::WaitingForMove {
            warn!("out-of-phase attack announce");
            return;
        }
        if self.config.role.attacks_on(self.battle.turn) {
            warn!("attack announce on our own turn");
            return;
        }
        let Some(attacker_name) = self
            .battle
            .opponent
            .as_ref()
            .map(|c| c.pokemon_name.clone())
        else {
            warn!("attack announce before setup");
            return;
        };
        let Some(dst) = self.conn.peer_addr else {
            warn!("attack announce from an unknown peer");
            return;
        };

        self.battle.pending = Some(PendingTurn::new(false, attacker_name, move_name));
        self.battle.phase = Phase::ProcessingTurn;
        self.send_reliable(Message::DefenseAnnounce, dst, None, now);
        self.compute_and_report(now);
    }

    /// Defender acknowledged our attack; run the calculator.
    pub(crate) fn on_defense_announce(&mut self, now: Instant) {
        if self.battle.phase != Phase::ProcessingTurn {
            warn!("out-of-phase defense announce");
            return;
        }
        let Some(pending) = self.battle.pending.as_ref() else {
            warn!("defense announce with no turn in flight");
            return;
        };
        if !pending.attacker_is_local {
            warn!("defense announce at the defender");
            return;
        }
        if pending.local_result.is_some() {
            warn!("duplicate defense announce");
            return;
        }
        self.compute_and_report(now);
    }

    /// Run the deterministic calculator for the turn in flight and report
    /// the outcome. Advances the PRNG exactly once.
    fn compute_and_report(&mut self, now: Instant) {
        let Some(pending) = self.battle.pending.as_ref() else {
            return;
        };
        let attacker_is_local = pending.attacker_is_local;
        let attacker_name = pending.attacker_name.clone();
        let move_name = pending.move_name.clone();

        let Some(mv) = self.repository.move_data(&move_name) else {
            // Move known to one side only: the repositories disagree and no
            // deterministic outcome exists.
            self.emit(Event::Fatal(format!("move not in repository: {move_name}")));
            self.close();
            return;
        };

        // Boost consumption follows the same rule on both peers, so the
        // consumed flag never needs to travel.
        let boost_applied = {
            let attacker = if attacker_is_local {
                self.battle.local.as_mut()
            } else {
                self.battle.opponent.as_mut()
            };
            match attacker {
                Some(attacker) if mv.category == MoveCategory::Special => {
                    attacker.consume_sp_attack_boost()
                }
                _ => false,
            }
        };

        let (attacker, defender) = if attacker_is_local {
            (self.battle.local.as_ref(), self.battle.opponent.as_ref())
        } else {
            (self.battle.opponent.as_ref(), self.battle.local.as_ref())
        };
        let (Some(attacker), Some(defender)) = (attacker, defender) else {
            warn!("turn in flight with a missing combatant");
            return;
        };
        let Some(rng) = self.rng.as_mut() else {
            warn!("turn in flight before seed exchange");
            return;
        };

        let outcome = compute_damage(attacker, defender, &mv, boost_applied, rng);
        let report = TurnReport {
            damage_dealt: outcome.damage,
            defender_hp_after: outcome.defender_hp_after,
            attacker_hp_after: attacker.current_hp,
            status_message: outcome.status_message,
        };

        if let Some(pending) = self.battle.pending.as_mut() {
            pending.local_result = Some(report.clone());
        }

        let Some(dst) = self.conn.peer_addr else {
            return;
        };
        self.send_reliable(
            Message::CalculationReport {
                attacker: attacker_name,
                move_used: move_name,
                remaining_health: report.attacker_hp_after,
                damage_dealt: report.damage_dealt,
                defender_hp_remaining: report.defender_hp_after,
                status_message: report.status_message.clone(),
            },
            dst,
            None,
            now,
        );

        // The opponent's report may have arrived while we were still waiting
        // for the defense announce.
        if self
            .battle
            .pending
            .as_ref()
            .is_some_and(|p| p.remote_result.is_some())
        {
            self.compare_reports(now);
        }
    }

    pub(crate) fn on_calculation_report(
        &mut self,
        remaining_health: u32,
        damage_dealt: u32,
        defender_hp_remaining: u32,
        status_message: String,
        now: Instant,
    ) {
        if self.battle.phase != Phase::ProcessingTurn {
            warn!("out-of-phase calculation report");
            return;
        }
        let Some(pending) = self.battle.pending.as_mut() else {
            warn!("calculation report with no turn in flight");
            return;
        };
        if pending.remote_result.is_some() {
            warn!("duplicate calculation report");
            return;
        }
        pending.remote_result = Some(TurnReport {
            damage_dealt,
            defender_hp_after: defender_hp_remaining,
            attacker_hp_after: remaining_health,
            status_message,
        });

        if pending.local_result.is_some() {
            self.compare_reports(now);
        }
    }

    /// Both results are in: exact integer comparison of damage and defender
    /// HP decides between confirm and resolution.
    fn compare_reports(&mut self, now: Instant) {
        let Some(pending) = self.battle.pending.as_ref() else {
            return;
        };
        if pending.confirm_sent || pending.resolution_sent {
            return;
        }
        let (Some(local), Some(remote)) = (&pending.local_result, &pending.remote_result) else {
            return;
        };

        let verified = local.damage_dealt == remote.damage_dealt
            && local.defender_hp_after == remote.defender_hp_after;
        let attacker_is_local = pending.attacker_is_local;
        let attacker_name = pending.attacker_name.clone();
        let move_name = pending.move_name.clone();
        let local = local.clone();
        let remote_damage = remote.damage_dealt;

        let Some(dst) = self.conn.peer_addr else {
            return;
        };

        if verified {
            self.apply_result(attacker_is_local, &local);
            self.send_reliable(Message::CalculationConfirm, dst, None, now);
            if let Some(pending) = self.battle.pending.as_mut() {
                pending.confirm_sent = true;
            }
            self.maybe_complete_turn(now);
        } else {
            warn!(
                local_damage = local.damage_dealt,
                remote_damage, "calculation mismatch, proposing local values"
            );
            self.send_reliable(
                Message::ResolutionRequest {
                    attacker: attacker_name,
                    move_used: move_name,
                    damage_dealt: local.damage_dealt,
                    defender_hp_remaining: local.defender_hp_after,
                },
                dst,
                None,
                now,
            );
            if let Some(pending) = self.battle.pending.as_mut() {
                pending.resolution_sent = true;
            }
        }
    }

    pub(crate) fn on_calculation_confirm(&mut self, now: Instant) {
        if self.battle.phase != Phase::ProcessingTurn {
            warn!("out-of-phase calculation confirm");
            return;
        }
        let Some(pending) = self.battle.pending.as_mut() else {
            warn!("calculation confirm with no turn in flight");
            return;
        };
        if pending.confirm_received {
            warn!("duplicate calculation confirm");
            return;
        }
        pending.confirm_received = true;

        if pending.resolution_sent {
            // The peer accepted the values we proposed.
            let attacker_is_local = pending.attacker_is_local;
            let local = pending.local_result.clone();
            if let Some(local) = local {
                self.apply_result(attacker_is_local, &local);
            }
            self.complete_turn(now);
        } else if pending.confirm_sent {
            self.complete_turn(now);
        }
        // Otherwise their confirm outran our comparison; the turn completes
        // when we send ours.
    }

    /// The peer observed a mismatch and proposes its values; we adopt them.
    pub(crate) fn on_resolution_request(
        &mut self,
        damage_dealt: u32,
        defender_hp_remaining: u32,
        now: Instant,
    ) {
        if self.battle.phase != Phase::ProcessingTurn {
            warn!("out-of-phase resolution request");
            return;
        }
        let Some(pending) = self.battle.pending.as_ref() else {
            warn!("resolution request with no turn in flight");
            return;
        };
        if pending.resolution_sent && self.config.role == Role::Host {
            // Crossed requests: the host's proposal stands, the joiner adopts.
            warn!("crossed resolution requests; host values stand");
            return;
        }

        let attacker_is_local = pending.attacker_is_local;
        let (attacker_hp_after, status_message) = match &pending.local_result {
            Some(local) => (local.attacker_hp_after, local.status_message.clone()),
            None => {
                let current = if attacker_is_local {
                    self.battle.local.as_ref()
                } else {
                    self.battle.opponent.as_ref()
                };
                (current.map(|c| c.current_hp).unwrap_or(0), String::new())
            }
        };
        let adopted = TurnReport {
            damage_dealt,
            defender_hp_after: defender_hp_remaining,
            attacker_hp_after,
            status_message,
        };

        let Some(dst) = self.conn.peer_addr else {
            return;
        };
        self.apply_result(attacker_is_local, &adopted);
        self.send_reliable(Message::CalculationConfirm, dst, None, now);
        self.complete_turn(now);
    }

    /// Write the agreed result into battle state and surface it. Applied
    /// values are absolute, so duplicates cannot double-count.
    fn apply_result(&mut self, attacker_is_local: bool, report: &TurnReport) {
        self.battle.apply_turn(attacker_is_local, report);
        let update = self.battle.defender(attacker_is_local).map(|defender| {
            (
                defender.pokemon_name.clone(),
                defender.current_hp,
                defender.max_hp(),
            )
        });
        if let Some((pokemon, current_hp, max_hp)) = update {
            self.emit(Event::HpUpdate {
                pokemon,
                current_hp,
                max_hp,
            });
        }
        if !report.status_message.is_empty() {
            self.emit(Event::Log(report.status_message.clone()));
        }
    }

    fn maybe_complete_turn(&mut self, now: Instant) {
        if self
            .battle
            .pending
            .as_ref()
            .is_some_and(|p| p.confirm_sent && p.confirm_received)
        {
            self.complete_turn(now);
        }
    }

    /// Advance the turn counter and either hand the move back to the players
    /// or end the game.
    fn complete_turn(&mut self, now: Instant) {
        let Some(pending) = self.battle.pending.as_ref() else {
            return;
        };
        let attacker_is_local = pending.attacker_is_local;
        let attacker_name = pending.attacker_name.clone();
        let defender = self.battle.defender(attacker_is_local);
        let defender_name = defender.map(|c| c.pokemon_name.clone()).unwrap_or_default();
        let defender_fainted = defender.map(|c| c.is_fainted()).unwrap_or(false);

        let turn = self.battle.advance_turn();

        if defender_fainted {
            self.battle.phase = Phase::GameOver;
            self.conn.phase = ConnectionPhase::GameOver;
            if attacker_is_local {
                // The winner notifies; the loser already knows locally.
                if let Some(dst) = self.conn.peer_addr {
                    self.send_reliable(
                        Message::GameOver {
                            winner: attacker_name.clone(),
                            loser: defender_name.clone(),
                        },
                        dst,
                        None,
                        now,
                    );
                }
            }
            self.emit(Event::Status(ConnectionPhase::GameOver));
            self.emit(Event::GameOver {
                winner: attacker_name,
                loser: defender_name,
            });
        } else {
            self.battle.phase = Phase::WaitingForMove;
            self.emit(Event::TurnIndicator {
                turn,
                your_move: self.config.role.attacks_on(turn),
            });
        }
    }
}
