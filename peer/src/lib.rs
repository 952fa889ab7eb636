//! Peer runtime for PokeProtocol: the reliability layer, the connection and
//! turn state machines, and the UDP driver that threads datagrams between
//! them.
//!
//! The crate is split along the suspension points of the protocol: the
//! [`Session`] is a synchronous core that consumes datagrams, timer
//! deadlines, and user input, and produces outbound datagrams plus display
//! [`Event`]s; [`Peer`] is the thin async loop that owns the socket and
//! drives it. All session state mutates on one task.

mod tests;

pub mod connection;
pub mod event;
pub mod input;
pub mod reliability;
pub mod runtime;
pub mod session;
mod turn;

pub use connection::{ConnectionPhase, Role};
pub use event::Event;
pub use input::UserInput;
pub use reliability::{Reliability, RetryAction, MAX_RETRIES, TIMEOUT_MS};
pub use runtime::{Peer, PeerHandle};
pub use session::{PeerConfig, Session};
