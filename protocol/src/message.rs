//! The tagged message taxonomy and its packet envelope.
//!
//! Every frame decodes to a [`Packet`]: an optional sequence number, an
//! optional ack number, and a validated [`Message`] body. Reliable messages
//! carry a sequence number; an ACK carries only an ack number.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::wire::{self, FieldValue, Fields};
use crate::ProtocolError;

/// The closed set of wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    HandshakeRequest,
    HandshakeResponse,
    SpectatorRequest,
    BattleSetup,
    AttackAnnounce,
    DefenseAnnounce,
    CalculationReport,
    CalculationConfirm,
    ResolutionRequest,
    GameOver,
    ChatMessage,
    Ack,
}

impl MessageType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HANDSHAKE_REQUEST" => Some(MessageType::HandshakeRequest),
            "HANDSHAKE_RESPONSE" => Some(MessageType::HandshakeResponse),
            "SPECTATOR_REQUEST" => Some(MessageType::SpectatorRequest),
            "BATTLE_SETUP" => Some(MessageType::BattleSetup),
            "ATTACK_ANNOUNCE" => Some(MessageType::AttackAnnounce),
            "DEFENSE_ANNOUNCE" => Some(MessageType::DefenseAnnounce),
            "CALCULATION_REPORT" => Some(MessageType::CalculationReport),
            "CALCULATION_CONFIRM" => Some(MessageType::CalculationConfirm),
            "RESOLUTION_REQUEST" => Some(MessageType::ResolutionRequest),
            "GAME_OVER" => Some(MessageType::GameOver),
            "CHAT_MESSAGE" => Some(MessageType::ChatMessage),
            "ACK" => Some(MessageType::Ack),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::HandshakeRequest => "HANDSHAKE_REQUEST",
            MessageType::HandshakeResponse => "HANDSHAKE_RESPONSE",
            MessageType::SpectatorRequest => "SPECTATOR_REQUEST",
            MessageType::BattleSetup => "BATTLE_SETUP",
            MessageType::AttackAnnounce => "ATTACK_ANNOUNCE",
            MessageType::DefenseAnnounce => "DEFENSE_ANNOUNCE",
            MessageType::CalculationReport => "CALCULATION_REPORT",
            MessageType::CalculationConfirm => "CALCULATION_CONFIRM",
            MessageType::ResolutionRequest => "RESOLUTION_REQUEST",
            MessageType::GameOver => "GAME_OVER",
            MessageType::ChatMessage => "CHAT_MESSAGE",
            MessageType::Ack => "ACK",
        }
    }

    /// Whether frames of this type carry a sequence number and are
    /// retransmitted until acknowledged. Everything but ACK.
    pub fn is_reliable(&self) -> bool {
        !matches!(self, MessageType::Ack)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stat boost allowances announced in BATTLE_SETUP, serialized as a JSON
/// object on a single wire line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatBoosts {
    pub sp_attack_uses: u32,
    pub sp_defense_uses: u32,
}

/// How a peer intends its frames to be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunicationMode {
    P2p,
    Broadcast,
}

impl CommunicationMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "P2P" => Some(CommunicationMode::P2p),
            "BROADCAST" => Some(CommunicationMode::Broadcast),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommunicationMode::P2p => "P2P",
            CommunicationMode::Broadcast => "BROADCAST",
        }
    }
}

/// Chat payload: plain text or an opaque base64 sticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatContent {
    Text(String),
    Sticker(String),
}

impl ChatContent {
    pub fn content_type(&self) -> &'static str {
        match self {
            ChatContent::Text(_) => "TEXT",
            ChatContent::Sticker(_) => "STICKER",
        }
    }
}

/// A validated protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Sent by the joiner to open a session. The optional seed is advisory
    /// only; the host always issues its own.
    HandshakeRequest {
        peer_id: String,
        seed: Option<u32>,
        team_preview: Vec<String>,
    },

    /// Host's reply, carrying the authoritative session seed. On the wire
    /// this frame also piggybacks an ack for the request.
    HandshakeResponse {
        seed: u32,
        peer_id: String,
        team_preview: Vec<String>,
        timestamp: i64,
    },

    SpectatorRequest {
        peer_id: String,
    },

    BattleSetup {
        communication_mode: CommunicationMode,
        pokemon_name: String,
        stat_boosts: StatBoosts,
    },

    AttackAnnounce {
        move_name: String,
    },

    DefenseAnnounce,

    /// One peer's independently computed turn outcome.
    CalculationReport {
        attacker: String,
        move_used: String,
        remaining_health: u32,
        damage_dealt: u32,
        defender_hp_remaining: u32,
        status_message: String,
    },

    CalculationConfirm,

    /// Sent by a peer that observed a mismatch, proposing its own values as
    /// the source of truth.
    ResolutionRequest {
        attacker: String,
        move_used: String,
        damage_dealt: u32,
        defender_hp_remaining: u32,
    },

    GameOver {
        winner: String,
        loser: String,
    },

    ChatMessage {
        sender_name: String,
        content: ChatContent,
    },

    Ack,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::HandshakeRequest { .. } => MessageType::HandshakeRequest,
            Message::HandshakeResponse { .. } => MessageType::HandshakeResponse,
            Message::SpectatorRequest { .. } => MessageType::SpectatorRequest,
            Message::BattleSetup { .. } => MessageType::BattleSetup,
            Message::AttackAnnounce { .. } => MessageType::AttackAnnounce,
            Message::DefenseAnnounce => MessageType::DefenseAnnounce,
            Message::CalculationReport { .. } => MessageType::CalculationReport,
            Message::CalculationConfirm => MessageType::CalculationConfirm,
            Message::ResolutionRequest { .. } => MessageType::ResolutionRequest,
            Message::GameOver { .. } => MessageType::GameOver,
            Message::ChatMessage { .. } => MessageType::ChatMessage,
            Message::Ack => MessageType::Ack,
        }
    }

    /// Append this message's payload fields, in their fixed wire order.
    fn encode_fields(&self, out: &mut String) {
        match self {
            Message::HandshakeRequest {
                peer_id,
                seed,
                team_preview,
            } => {
                push_str(out, "peer_id", peer_id);
                if let Some(seed) = seed {
                    push_int(out, "seed", *seed as i64);
                }
                push_json(out, "team_preview", &string_list_json(team_preview));
            }
            Message::HandshakeResponse {
                seed,
                peer_id,
                team_preview,
                timestamp,
            } => {
                push_int(out, "seed", *seed as i64);
                push_str(out, "peer_id", peer_id);
                push_json(out, "team_preview", &string_list_json(team_preview));
                push_int(out, "timestamp", *timestamp);
            }
            Message::SpectatorRequest { peer_id } => {
                push_str(out, "peer_id", peer_id);
            }
            Message::BattleSetup {
                communication_mode,
                pokemon_name,
                stat_boosts,
            } => {
                push_str(out, "communication_mode", communication_mode.as_str());
                push_str(out, "pokemon_name", pokemon_name);
                let boosts = serde_json::to_value(stat_boosts).unwrap_or(Json::Null);
                push_json(out, "stat_boosts", &boosts);
            }
            Message::AttackAnnounce { move_name } => {
                push_str(out, "move_name", move_name);
            }
            Message::DefenseAnnounce => {}
            Message::CalculationReport {
                attacker,
                move_used,
                remaining_health,
                damage_dealt,
                defender_hp_remaining,
                status_message,
            } => {
                push_str(out, "attacker", attacker);
                push_str(out, "move_used", move_used);
                push_int(out, "remaining_health", *remaining_health as i64);
                push_int(out, "damage_dealt", *damage_dealt as i64);
                push_int(out, "defender_hp_remaining", *defender_hp_remaining as i64);
                push_str(out, "status_message", status_message);
            }
            Message::CalculationConfirm => {}
            Message::ResolutionRequest {
                attacker,
                move_used,
                damage_dealt,
                defender_hp_remaining,
            } => {
                push_str(out, "attacker", attacker);
                push_str(out, "move_used", move_used);
                push_int(out, "damage_dealt", *damage_dealt as i64);
                push_int(out, "defender_hp_remaining", *defender_hp_remaining as i64);
            }
            Message::GameOver { winner, loser } => {
                push_str(out, "winner", winner);
                push_str(out, "loser", loser);
            }
            Message::ChatMessage {
                sender_name,
                content,
            } => {
                push_str(out, "sender_name", sender_name);
                push_str(out, "content_type", content.content_type());
                match content {
                    ChatContent::Text(text) => push_str(out, "message_text", text),
                    ChatContent::Sticker(data) => push_str(out, "sticker_data", data),
                }
            }
            Message::Ack => {}
        }
    }

    /// Validate a decoded field map into a typed message.
    fn from_fields(tag: MessageType, fields: &Fields) -> Result<Self, ProtocolError> {
        match tag {
            MessageType::HandshakeRequest => Ok(Message::HandshakeRequest {
                peer_id: req_str(fields, "peer_id")?,
                seed: opt_u32(fields, "seed")?,
                team_preview: req_string_list(fields, "team_preview")?,
            }),
            MessageType::HandshakeResponse => Ok(Message::HandshakeResponse {
                seed: req_u32(fields, "seed")?,
                peer_id: req_str(fields, "peer_id")?,
                team_preview: req_string_list(fields, "team_preview")?,
                timestamp: req_i64(fields, "timestamp")?,
            }),
            MessageType::SpectatorRequest => Ok(Message::SpectatorRequest {
                peer_id: req_str(fields, "peer_id")?,
            }),
            MessageType::BattleSetup => {
                let mode = req_str(fields, "communication_mode")?;
                let communication_mode = CommunicationMode::parse(&mode).ok_or(
                    ProtocolError::InvalidField {
                        field: "communication_mode",
                        value: mode,
                    },
                )?;
                Ok(Message::BattleSetup {
                    communication_mode,
                    pokemon_name: req_str(fields, "pokemon_name")?,
                    stat_boosts: req_stat_boosts(fields, "stat_boosts")?,
                })
            }
            MessageType::AttackAnnounce => Ok(Message::AttackAnnounce {
                move_name: req_str(fields, "move_name")?,
            }),
            MessageType::DefenseAnnounce => Ok(Message::DefenseAnnounce),
            MessageType::CalculationReport => Ok(Message::CalculationReport {
                attacker: req_str(fields, "attacker")?,
                move_used: req_str(fields, "move_used")?,
                remaining_health: req_u32(fields, "remaining_health")?,
                damage_dealt: req_u32(fields, "damage_dealt")?,
                defender_hp_remaining: req_u32(fields, "defender_hp_remaining")?,
                status_message: req_str(fields, "status_message")?,
            }),
            MessageType::CalculationConfirm => Ok(Message::CalculationConfirm),
            MessageType::ResolutionRequest => Ok(Message::ResolutionRequest {
                attacker: req_str(fields, "attacker")?,
                move_used: req_str(fields, "move_used")?,
                damage_dealt: req_u32(fields, "damage_dealt")?,
                defender_hp_remaining: req_u32(fields, "defender_hp_remaining")?,
            }),
            MessageType::GameOver => Ok(Message::GameOver {
                winner: req_str(fields, "winner")?,
                loser: req_str(fields, "loser")?,
            }),
            MessageType::ChatMessage => {
                let sender_name = req_str(fields, "sender_name")?;
                let content_type = req_str(fields, "content_type")?;
                let content = match content_type.as_str() {
                    "TEXT" => ChatContent::Text(req_str(fields, "message_text")?),
                    "STICKER" => ChatContent::Sticker(req_str(fields, "sticker_data")?),
                    other => {
                        return Err(ProtocolError::InvalidField {
                            field: "content_type",
                            value: other.to_string(),
                        })
                    }
                };
                Ok(Message::ChatMessage {
                    sender_name,
                    content,
                })
            }
            MessageType::Ack => Ok(Message::Ack),
        }
    }
}

/// A frame as it travels: envelope numbers plus the message body.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Per-sender monotone sequence number. Present on every reliable frame,
    /// never on an ACK.
    pub sequence: Option<u64>,
    /// Acknowledged sequence number. The whole payload of an ACK, or a
    /// piggyback on HANDSHAKE_RESPONSE.
    pub ack: Option<u64>,
    pub body: Message,
}

impl Packet {
    /// A bare ACK for the given sequence number.
    pub fn ack(ack_number: u64) -> Self {
        Packet {
            sequence: None,
            ack: Some(ack_number),
            body: Message::Ack,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Serialize to wire text. No trailing newline.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        push_str(&mut out, "message_type", self.message_type().as_str());
        if let Some(seq) = self.sequence {
            push_int(&mut out, "sequence_number", seq as i64);
        }
        if let Some(ack) = self.ack {
            push_int(&mut out, "ack_number", ack as i64);
        }
        self.body.encode_fields(&mut out);
        out
    }

    /// Parse and validate a full frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ProtocolError::MalformedFrame("frame is not valid UTF-8".to_string()))?;
        let fields = wire::decode_fields(text);

        let tag_text = fields
            .get("message_type")
            .map(|v| v.to_wire())
            .ok_or_else(|| ProtocolError::MalformedFrame("missing message_type".to_string()))?;
        let tag = MessageType::parse(&tag_text)
            .ok_or_else(|| ProtocolError::UnknownMessageType(tag_text.clone()))?;

        let sequence = opt_u64(&fields, "sequence_number")?;
        let ack = opt_u64(&fields, "ack_number")?;
        let body = Message::from_fields(tag, &fields)?;

        Ok(Packet {
            sequence,
            ack,
            body,
        })
    }
}

fn push_str(out: &mut String, key: &str, value: &str) {
    wire::push_line(out, key, &FieldValue::Str(value.to_string()));
}

fn push_int(out: &mut String, key: &str, value: i64) {
    wire::push_line(out, key, &FieldValue::Int(value));
}

fn push_json(out: &mut String, key: &str, value: &Json) {
    wire::push_line(out, key, &FieldValue::Json(value.clone()));
}

fn string_list_json(list: &[String]) -> Json {
    Json::Array(list.iter().map(|s| Json::String(s.clone())).collect())
}

fn req_str(fields: &Fields, key: &'static str) -> Result<String, ProtocolError> {
    match fields.get(key) {
        // Scalar keys that happen to look numeric still validate as strings.
        Some(FieldValue::Str(s)) => Ok(s.clone()),
        Some(FieldValue::Int(n)) => Ok(n.to_string()),
        Some(FieldValue::Float(f)) => Ok(f.to_string()),
        Some(FieldValue::Json(_)) => Err(ProtocolError::InvalidField {
            field: key,
            value: "unexpected structured value".to_string(),
        }),
        None => Err(ProtocolError::MissingField(key)),
    }
}

fn req_i64(fields: &Fields, key: &'static str) -> Result<i64, ProtocolError> {
    let value = fields.get(key).ok_or(ProtocolError::MissingField(key))?;
    value.as_int().ok_or_else(|| ProtocolError::InvalidField {
        field: key,
        value: value.to_wire(),
    })
}

fn req_u32(fields: &Fields, key: &'static str) -> Result<u32, ProtocolError> {
    let n = req_i64(fields, key)?;
    u32::try_from(n).map_err(|_| ProtocolError::InvalidField {
        field: key,
        value: n.to_string(),
    })
}

fn opt_u64(fields: &Fields, key: &'static str) -> Result<Option<u64>, ProtocolError> {
    match fields.get(key) {
        None => Ok(None),
        Some(value) => {
            let n = value.as_int().ok_or_else(|| ProtocolError::InvalidField {
                field: key,
                value: value.to_wire(),
            })?;
            let n = u64::try_from(n).map_err(|_| ProtocolError::InvalidField {
                field: key,
                value: n.to_string(),
            })?;
            Ok(Some(n))
        }
    }
}

fn opt_u32(fields: &Fields, key: &'static str) -> Result<Option<u32>, ProtocolError> {
    match opt_u64(fields, key)? {
        None => Ok(None),
        Some(n) => {
            let n = u32::try_from(n).map_err(|_| ProtocolError::InvalidField {
                field: key,
                value: n.to_string(),
            })?;
            Ok(Some(n))
        }
    }
}

fn req_string_list(fields: &Fields, key: &'static str) -> Result<Vec<String>, ProtocolError> {
    let value = fields.get(key).ok_or(ProtocolError::MissingField(key))?;
    let json = value.as_json().ok_or_else(|| ProtocolError::InvalidField {
        field: key,
        value: value.to_wire(),
    })?;
    let array = json.as_array().ok_or_else(|| ProtocolError::InvalidField {
        field: key,
        value: json.to_string(),
    })?;
    array
        .iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| ProtocolError::InvalidField {
                    field: key,
                    value: v.to_string(),
                })
        })
        .collect()
}

fn req_stat_boosts(fields: &Fields, key: &'static str) -> Result<StatBoosts, ProtocolError> {
    let value = fields.get(key).ok_or(ProtocolError::MissingField(key))?;
    let json = value.as_json().ok_or_else(|| ProtocolError::InvalidField {
        field: key,
        value: value.to_wire(),
    })?;
    serde_json::from_value(json.clone()).map_err(|_| ProtocolError::InvalidField {
        field: key,
        value: json.to_string(),
    })
}
