use thiserror::Error;


pub mod message;
pub mod wire;

pub use message::{ChatContent, CommunicationMode, Message, MessageType, Packet, StatBoosts};
pub use wire::{parse_header, FieldValue, Fields, Header, MAX_HEADER_LINES};

#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Payload has no `message_type` line or is otherwise unframeable.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}
