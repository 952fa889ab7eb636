//! At-least-once delivery over best-effort datagrams.
//!
//! Every reliable frame gets the next monotone sequence number and sits in
//! the pending buffer until the matching ACK arrives. The layer owns no
//! clock: the driver asks for the next deadline, sleeps, and feeds the
//! current time back in, which also makes the retry schedule testable with
//! fabricated instants.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Retransmission timeout. A contract constant; changing it makes the
/// implementation non-conforming.
pub const TIMEOUT_MS: u64 = 500;

/// Retransmissions attempted before the session is torn down.
pub const MAX_RETRIES: u32 = 3;

#[derive(Debug)]
struct PendingPacket {
    bytes: Vec<u8>,
    dst: SocketAddr,
    retries: u32,
    deadline: Instant,
}

/// What the caller must do after a deadline fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    /// Send these bytes again, unchanged.
    Retransmit { sequence: u64, bytes: Vec<u8>, dst: SocketAddr },
    /// Retries exhausted; the session is dead. The buffer has already been
    /// cleared and no further actions will be produced.
    Exhausted { sequence: u64 },
}

/// Sequence issuance plus the retransmission buffer.
#[derive(Debug, Default)]
pub struct Reliability {
    next_sequence: u64,
    pending: HashMap<u64, PendingPacket>,
}

impl Reliability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence number. Starts at 1, strictly increasing.
    pub fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    /// Buffer an already-transmitted frame for retransmission.
    pub fn register(&mut self, sequence: u64, bytes: Vec<u8>, dst: SocketAddr, now: Instant) {
        self.pending.insert(
            sequence,
            PendingPacket {
                bytes,
                dst,
                retries: 0,
                deadline: now + Duration::from_millis(TIMEOUT_MS),
            },
        );
    }

    /// Consume an ACK. Duplicate or unmatched ACKs are no-ops; returns
    /// whether an entry was actually cleared.
    pub fn acknowledge(&mut self, ack_number: u64) -> bool {
        let cleared = self.pending.remove(&ack_number).is_some();
        if cleared {
            debug!(sequence = ack_number, "acknowledged");
        }
        cleared
    }

    /// Earliest pending deadline, if any packet is in flight.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Process every deadline at or before `now`.
    ///
    /// On exhaustion the whole buffer is dropped and a single
    /// [`RetryAction::Exhausted`] is returned; the failure is fatal for the
    /// session, not for one packet.
    pub fn on_deadline(&mut self, now: Instant) -> Vec<RetryAction> {
        let mut due: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(seq, _)| *seq)
            .collect();
        due.sort_unstable();

        let mut actions = Vec::new();
        for sequence in due {
            let Some(packet) = self.pending.get_mut(&sequence) else {
                continue;
            };
            if packet.retries >= MAX_RETRIES {
                warn!(sequence, retries = packet.retries, "retries exhausted");
                self.clear();
                return vec![RetryAction::Exhausted { sequence }];
            }
            packet.retries += 1;
            packet.deadline = now + Duration::from_millis(TIMEOUT_MS);
            debug!(sequence, attempt = packet.retries, "retransmitting");
            actions.push(RetryAction::Retransmit {
                sequence,
                bytes: packet.bytes.clone(),
                dst: packet.dst,
            });
        }
        actions
    }

    /// Drop every pending packet and cancel all deadlines.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, sequence: u64) -> bool {
        self.pending.contains_key(&sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn sequence_numbers_start_at_one_and_are_contiguous() {
        let mut r = Reliability::new();
        assert_eq!(r.next_sequence(), 1);
        assert_eq!(r.next_sequence(), 2);
        assert_eq!(r.next_sequence(), 3);
    }

    #[test]
    fn ack_clears_buffer_and_deadline() {
        let t0 = Instant::now();
        let mut r = Reliability::new();
        let seq = r.next_sequence();
        r.register(seq, b"frame".to_vec(), addr(), t0);
        assert!(r.contains(seq));
        assert!(r.next_deadline().is_some());

        assert!(r.acknowledge(seq));
        assert!(!r.contains(seq));
        assert_eq!(r.next_deadline(), None);
    }

    #[test]
    fn duplicate_acks_are_noops() {
        let t0 = Instant::now();
        let mut r = Reliability::new();
        let seq = r.next_sequence();
        r.register(seq, b"frame".to_vec(), addr(), t0);

        assert!(r.acknowledge(seq));
        assert!(!r.acknowledge(seq));
        assert!(!r.acknowledge(99));
    }

    #[test]
    fn retry_schedule_then_exhaustion() {
        let t0 = Instant::now();
        let mut r = Reliability::new();
        let seq = r.next_sequence();
        r.register(seq, b"frame".to_vec(), addr(), t0);

        // Retransmissions at t0+500, t0+1000, t0+1500.
        for attempt in 1..=MAX_RETRIES {
            let now = t0 + ms(TIMEOUT_MS * u64::from(attempt));
            let actions = r.on_deadline(now);
            assert_eq!(actions.len(), 1, "attempt {attempt}");
            assert!(matches!(
                actions[0],
                RetryAction::Retransmit { sequence, .. } if sequence == seq
            ));
        }

        // Fourth firing, at t0+2000: fatal, buffer cleared.
        let actions = r.on_deadline(t0 + ms(TIMEOUT_MS * 4));
        assert_eq!(actions, vec![RetryAction::Exhausted { sequence: seq }]);
        assert!(r.is_empty());
        assert_eq!(r.next_deadline(), None);
    }

    #[test]
    fn deadline_not_due_produces_nothing() {
        let t0 = Instant::now();
        let mut r = Reliability::new();
        let seq = r.next_sequence();
        r.register(seq, b"frame".to_vec(), addr(), t0);
        assert!(r.on_deadline(t0 + ms(TIMEOUT_MS - 1)).is_empty());
    }

    #[test]
    fn earliest_deadline_wins() {
        let t0 = Instant::now();
        let mut r = Reliability::new();
        let first = r.next_sequence();
        r.register(first, b"a".to_vec(), addr(), t0);
        let second = r.next_sequence();
        r.register(second, b"b".to_vec(), addr(), t0 + ms(100));

        assert_eq!(r.next_deadline(), Some(t0 + ms(TIMEOUT_MS)));
        // Acknowledge the first; the later deadline remains.
        r.acknowledge(first);
        assert_eq!(r.next_deadline(), Some(t0 + ms(100 + TIMEOUT_MS)));
    }
}
