//! Framing: one text message per transport frame, `<prefix><payload>` with an optional ` STATUS=<digit>` suffix.
//!
//! Encoding does no escaping. Payloads must not contain ` STATUS=` nor start with a reserved prefix;
//! callers enforce that.

use crate::protocol::{
    AgentState, CommandStatus, ProtocolEvent, CAN_BE_FROZEN_PREFIX, DEFINITION_PREFIX,
    FROZEN_PREFIX, MAPPING_PREFIX, MUTED_PREFIX, STATE_PREFIX, STATUS_MARKER,
    TIMELINE_STATE_PREFIX,
};

/// Decode one message. Never fails: anything unrecognized becomes `UnknownMessage` with the text unchanged.
pub fn decode(message: &str) -> ProtocolEvent {
    if let Some(event) = decode_reserved(message) {
        return event;
    }
    match decode_command_status(message) {
        Some(status) => ProtocolEvent::CommandStatusReceived(status),
        None => ProtocolEvent::UnknownMessage(message.to_string()),
    }
}

/// Decode one frame received from the transport. Frames must be UTF-8 text.
pub fn decode_frame(bytes: &[u8]) -> Result<ProtocolEvent, FrameDecodeError> {
    let text = std::str::from_utf8(bytes)?;
    Ok(decode(text))
}

/// Error decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("frame is not utf-8 text: {0}")]
    NotText(#[from] std::str::Utf8Error),
}

/// Encode an event to its wire text.
pub fn encode(event: &ProtocolEvent) -> String {
    match event {
        ProtocolEvent::DefinitionReceived(json) => format!("{}{}", DEFINITION_PREFIX, json),
        ProtocolEvent::MappingReceived(json) => format!("{}{}", MAPPING_PREFIX, json),
        ProtocolEvent::TimelineStateUpdated(state) => {
            format!("{}{}", TIMELINE_STATE_PREFIX, state)
        }
        ProtocolEvent::AgentStateChanged(state) => match state {
            AgentState::Muted(b) => format!("{}{}", MUTED_PREFIX, flag(*b)),
            AgentState::Frozen(b) => format!("{}{}", FROZEN_PREFIX, flag(*b)),
            AgentState::CanBeFrozen(b) => format!("{}{}", CAN_BE_FROZEN_PREFIX, flag(*b)),
            AgentState::State(s) => format!("{}{}", STATE_PREFIX, s),
        },
        ProtocolEvent::CommandStatusReceived(status) => format!(
            "{}={} {}{}",
            status.name,
            status.params,
            STATUS_MARKER,
            flag(status.success)
        ),
        ProtocolEvent::UnknownMessage(text) => text.clone(),
    }
}

/// Encode an event into a transport frame.
pub fn encode_frame(event: &ProtocolEvent) -> Vec<u8> {
    encode(event).into_bytes()
}

fn flag(b: bool) -> char {
    if b {
        '1'
    } else {
        '0'
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

/// Reserved prefixes, first match wins. A reserved prefix with a bad value still claims the message.
fn decode_reserved(message: &str) -> Option<ProtocolEvent> {
    if let Some(json) = message.strip_prefix(DEFINITION_PREFIX) {
        return Some(ProtocolEvent::DefinitionReceived(json.to_string()));
    }
    if let Some(json) = message.strip_prefix(MAPPING_PREFIX) {
        return Some(ProtocolEvent::MappingReceived(json.to_string()));
    }
    if let Some(state) = message.strip_prefix(TIMELINE_STATE_PREFIX) {
        return Some(ProtocolEvent::TimelineStateUpdated(state.to_string()));
    }
    let flagged: [(&str, fn(bool) -> AgentState); 3] = [
        (MUTED_PREFIX, AgentState::Muted),
        (FROZEN_PREFIX, AgentState::Frozen),
        (CAN_BE_FROZEN_PREFIX, AgentState::CanBeFrozen),
    ];
    for (prefix, make) in flagged {
        if let Some(value) = message.strip_prefix(prefix) {
            let event = match parse_flag(value) {
                Some(b) => ProtocolEvent::AgentStateChanged(make(b)),
                None => ProtocolEvent::UnknownMessage(message.to_string()),
            };
            return Some(event);
        }
    }
    if let Some(state) = message.strip_prefix(STATE_PREFIX) {
        return Some(ProtocolEvent::AgentStateChanged(AgentState::State(
            state.to_string(),
        )));
    }
    None
}

/// `^<name>=(.*)\sSTATUS=(\d)$` where name is non-empty and has no whitespace.
fn decode_command_status(message: &str) -> Option<CommandStatus> {
    let (name, rest) = message.split_once('=')?;
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return None;
    }
    let mut tail = rest.chars();
    let digit = tail.next_back()?.to_digit(10)?;
    let before_digit = tail.as_str().strip_suffix(STATUS_MARKER)?;
    let mut head = before_digit.chars();
    if !head.next_back()?.is_whitespace() {
        return None;
    }
    // Params are a single line.
    if head.as_str().contains('\n') {
        return None;
    }
    Some(CommandStatus {
        name: name.to_string(),
        params: head.as_str().to_string(),
        success: digit != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn status(name: &str, params: &str, success: bool) -> ProtocolEvent {
        ProtocolEvent::CommandStatusReceived(CommandStatus {
            name: name.to_string(),
            params: params.to_string(),
            success,
        })
    }

    #[test]
    fn decode_definition() {
        assert_eq!(
            decode("DEFINITION={\"a\":1}"),
            ProtocolEvent::DefinitionReceived("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn decode_mapping_and_timeline() {
        assert_eq!(
            decode("MAPPING={}"),
            ProtocolEvent::MappingReceived("{}".to_string())
        );
        assert_eq!(
            decode("TIMELINE_STATE=PLAYING"),
            ProtocolEvent::TimelineStateUpdated("PLAYING".to_string())
        );
    }

    #[test]
    fn decode_load_platform_status() {
        assert_eq!(
            decode("LOAD_PLATFORM_FROM_PATH=/tmp/x.json STATUS=1"),
            status("LOAD_PLATFORM_FROM_PATH", "/tmp/x.json", true)
        );
        assert_eq!(
            decode("LOAD_PLATFORM_FROM_PATH=/tmp/x.json STATUS=0"),
            status("LOAD_PLATFORM_FROM_PATH", "/tmp/x.json", false)
        );
    }

    #[test]
    fn any_nonzero_digit_is_success() {
        assert_eq!(decode("X=a STATUS=7"), status("X", "a", true));
    }

    #[test]
    fn params_may_contain_spaces_and_equals() {
        assert_eq!(
            decode("RUN=a b=c STATUS=1"),
            status("RUN", "a b=c", true)
        );
        assert_eq!(decode("RUN= STATUS=1"), status("RUN", "", true));
        assert_eq!(decode("RUN=x\tSTATUS=0"), status("RUN", "x", false));
    }

    #[test]
    fn bad_status_suffix_is_unknown() {
        for text in [
            "X=a STATUS=12",
            "X=a STATUS=",
            "X=a STATUS=y",
            "X=aSTATUS=1",
            "X=a STATUS=1 ",
            "STATUS=1",
            "=a STATUS=1",
            "MY CMD=a STATUS=1",
            "X=STATUS=1",
        ] {
            assert_eq!(
                decode(text),
                ProtocolEvent::UnknownMessage(text.to_string()),
                "{text}"
            );
        }
    }

    #[test]
    fn multi_line_params_are_unknown() {
        assert_eq!(
            decode("X=a\nb STATUS=1"),
            ProtocolEvent::UnknownMessage("X=a\nb STATUS=1".to_string())
        );
        assert_eq!(decode("X=a b\nSTATUS=1"), status("X", "a b", true));
    }

    #[test]
    fn reserved_prefix_wins_over_status_pattern() {
        assert_eq!(
            decode("DEFINITION={} STATUS=1"),
            ProtocolEvent::DefinitionReceived("{} STATUS=1".to_string())
        );
        assert_eq!(
            decode("TIMELINE_STATE=x STATUS=0"),
            ProtocolEvent::TimelineStateUpdated("x STATUS=0".to_string())
        );
    }

    #[test]
    fn agent_state_broadcasts() {
        assert_eq!(
            decode("MUTED=1"),
            ProtocolEvent::AgentStateChanged(AgentState::Muted(true))
        );
        assert_eq!(
            decode("FROZEN=0"),
            ProtocolEvent::AgentStateChanged(AgentState::Frozen(false))
        );
        assert_eq!(
            decode("CANBEFROZEN=1"),
            ProtocolEvent::AgentStateChanged(AgentState::CanBeFrozen(true))
        );
        assert_eq!(
            decode("STATE=RUNNING"),
            ProtocolEvent::AgentStateChanged(AgentState::State("RUNNING".to_string()))
        );
        assert_eq!(
            decode("MUTED=yes"),
            ProtocolEvent::UnknownMessage("MUTED=yes".to_string())
        );
    }

    #[test]
    fn encode_matches_grammar() {
        assert_eq!(
            encode(&status("LOAD_PLATFORM_FROM_PATH", "/tmp/x.json", false)),
            "LOAD_PLATFORM_FROM_PATH=/tmp/x.json STATUS=0"
        );
        assert_eq!(
            encode(&ProtocolEvent::TimelineStateUpdated("STOPPED".to_string())),
            "TIMELINE_STATE=STOPPED"
        );
        assert_eq!(
            encode(&ProtocolEvent::AgentStateChanged(AgentState::CanBeFrozen(true))),
            "CANBEFROZEN=1"
        );
        let raw = "whatever text";
        assert_eq!(encode(&decode(raw)), raw);
    }

    #[test]
    fn frame_must_be_text() {
        assert!(matches!(
            decode_frame(&[0xff, 0xfe, 0x00]),
            Err(FrameDecodeError::NotText(_))
        ));
        let frame = encode_frame(&ProtocolEvent::MappingReceived("{}".to_string()));
        assert_eq!(
            decode_frame(&frame).unwrap(),
            ProtocolEvent::MappingReceived("{}".to_string())
        );
    }

    proptest! {
        #[test]
        fn unrecognized_text_passes_through(text in "[a-z0-9 _.#/-]{0,64}") {
            // Lowercase text never hits an uppercase reserved prefix or the STATUS marker.
            prop_assert_eq!(decode(&text), ProtocolEvent::UnknownMessage(text.clone()));
            prop_assert_eq!(encode(&decode(&text)), text);
        }
    }
}
