//! Decoded events and command names

use serde_json::Value;
use std::fmt;

/// Command name of the synthetic heartbeat-reply event
pub const HEARTBEAT_CMD: &str = "HEARTBEAT";

/// Event command discriminator
///
/// Frequent commands get their own variant; everything else is kept
/// verbatim in [`Command::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    Heartbeat,
    DanmuMsg,
    SendGift,
    InteractWord,
    SuperChatMessage,
    GuardBuy,
    Live,
    Preparing,
    WatchedChange,
    Other(String),
}

impl Command {
    pub fn as_str(&self) -> &str {
        match self {
            Command::Heartbeat => HEARTBEAT_CMD,
            Command::DanmuMsg => "DANMU_MSG",
            Command::SendGift => "SEND_GIFT",
            Command::InteractWord => "INTERACT_WORD",
            Command::SuperChatMessage => "SUPER_CHAT_MESSAGE",
            Command::GuardBuy => "GUARD_BUY",
            Command::Live => "LIVE",
            Command::Preparing => "PREPARING",
            Command::WatchedChange => "WATCHED_CHANGE",
            Command::Other(name) => name,
        }
    }
}

impl From<&str> for Command {
    fn from(name: &str) -> Self {
        match name {
            HEARTBEAT_CMD => Command::Heartbeat,
            "DANMU_MSG" => Command::DanmuMsg,
            "SEND_GIFT" => Command::SendGift,
            "INTERACT_WORD" => Command::InteractWord,
            "SUPER_CHAT_MESSAGE" => Command::SuperChatMessage,
            "GUARD_BUY" => Command::GuardBuy,
            "LIVE" => Command::Live,
            "PREPARING" => Command::Preparing,
            "WATCHED_CHANGE" => Command::WatchedChange,
            other => Command::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded application event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Heartbeat reply carrying the room's online count
    Heartbeat { online: u32 },
    /// A JSON body, usually an object with a `cmd` field
    Json(Value),
}

impl Event {
    /// The event's command, if it carries one
    pub fn command(&self) -> Option<Command> {
        match self {
            Event::Heartbeat { .. } => Some(Command::Heartbeat),
            Event::Json(value) => value.get("cmd").and_then(Value::as_str).map(Command::from),
        }
    }

    /// Online count, for heartbeat events
    pub fn online(&self) -> Option<u32> {
        match self {
            Event::Heartbeat { online } => Some(*online),
            Event::Json(_) => None,
        }
    }

    /// Event as JSON, with heartbeats rendered as `{cmd, online}`
    pub fn to_json(&self) -> Value {
        match self {
            Event::Heartbeat { online } => serde_json::json!({
                "cmd": HEARTBEAT_CMD,
                "online": online,
            }),
            Event::Json(value) => value.clone(),
        }
    }
}
