//! Peer bus text protocol: reserved prefixes, decoded event types, command builders.

use serde::Deserialize;

/// Reserved prefixes in the order the codec tests them. Generic command status is tried after all of these.
pub const DEFINITION_PREFIX: &str = "DEFINITION=";
pub const MAPPING_PREFIX: &str = "MAPPING=";
pub const TIMELINE_STATE_PREFIX: &str = "TIMELINE_STATE=";
pub const MUTED_PREFIX: &str = "MUTED=";
pub const FROZEN_PREFIX: &str = "FROZEN=";
pub const CAN_BE_FROZEN_PREFIX: &str = "CANBEFROZEN=";
pub const STATE_PREFIX: &str = "STATE=";

/// Separator between command parameters and the trailing status digit.
pub const STATUS_MARKER: &str = "STATUS=";

/// Command asking an editor to load a platform file; replied to with a status.
pub const LOAD_PLATFORM_FROM_PATH: &str = "LOAD_PLATFORM_FROM_PATH";
/// Command asking a recorder to delete a record.
pub const DELETE_RECORD: &str = "DELETE_RECORD";

/// Default broadcast group of the bus.
pub const DEFAULT_GROUP: &str = "INGESCAPE_PRIVATE";

/// Status reply to a command: `<name>=<params> STATUS=<digit>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStatus {
    pub name: String,
    pub params: String,
    pub success: bool,
}

/// State change an agent broadcasts about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentState {
    Muted(bool),
    Frozen(bool),
    CanBeFrozen(bool),
    /// Free-form state name.
    State(String),
}

/// One decoded protocol message. Closed set; consumers match exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    DefinitionReceived(String),
    MappingReceived(String),
    TimelineStateUpdated(String),
    AgentStateChanged(AgentState),
    CommandStatusReceived(CommandStatus),
    /// Raw text that matched nothing. Logged, never fatal.
    UnknownMessage(String),
}

/// Payload of a received agent definition; only the parts the protocol layer inspects.
#[derive(Debug, Deserialize)]
struct DefinitionEnvelope {
    definition: DefinitionHeader,
}

#[derive(Debug, Deserialize)]
struct DefinitionHeader {
    name: String,
}

/// Error inspecting a definition payload.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("invalid definition json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Agent name declared in a definition payload (`{"definition": {"name": ...}}`).
pub fn definition_name(json: &str) -> Result<String, DefinitionError> {
    let envelope: DefinitionEnvelope = serde_json::from_str(json)?;
    Ok(envelope.definition.name)
}

/// `LOAD_PLATFORM_FROM_PATH=<path>`
pub fn load_platform_from_path(path: &str) -> String {
    format!("{}={}", LOAD_PLATFORM_FROM_PATH, path)
}

/// `DELETE_RECORD#<id>`
pub fn delete_record(record_id: &str) -> String {
    format!("{}#{}", DELETE_RECORD, record_id)
}

/// Name of a command: text before the first `=` or `#`, or the whole text.
pub fn command_name(command_text: &str) -> &str {
    match command_text.find(&['=', '#'][..]) {
        Some(i) => &command_text[..i],
        None => command_text,
    }
}
