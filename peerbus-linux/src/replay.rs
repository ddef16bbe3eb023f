//! Line transport: reads bus events and operator commands as text lines (stdin or a replay file).
//!
//! ```text
//! ENTER <peer> <name> <address> [key=value]...
//! JOIN <peer> <name> <group>
//! LEAVE <peer> <name> <group>
//! SHOUT <peer> <name> <group> <text>
//! WHISPER <peer> <name> <text>
//! EXIT <peer> <name>
//! > SEND <peer> <command text>
//! > TIMELINE <state>
//! > ABANDON <command name>
//! ```
//! Peer ids and names are single tokens. Blank lines and `#` comments are skipped.

use std::collections::HashMap;

use peerbus_core::{EventKind, PeerId, TransportEvent};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Event(TransportEvent),
    Operator(OperatorCommand),
}

/// Requests from the local operator, executed by the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Send { target: PeerId, text: String },
    Timeline(String),
    Abandon(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    #[error("unknown event kind {0:?}")]
    UnknownKind(String),
    #[error("unknown operator command {0:?}")]
    UnknownOperator(String),
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("header {0:?} is not key=value")]
    BadHeader(String),
    #[error("line is not UTF-8 outside the message text")]
    NotText,
}

/// Parse one line. Ok(None) for blank lines and comments.
pub fn parse_line(line: &str) -> Result<Option<Line>, LineError> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    if let Some(rest) = trimmed.strip_prefix('>') {
        return parse_operator(rest).map(|c| Some(Line::Operator(c)));
    }
    let mut rest = trimmed;
    let kind_str = next_field(&mut rest).ok_or(LineError::Missing("event kind"))?;
    let kind =
        EventKind::parse(kind_str).ok_or_else(|| LineError::UnknownKind(kind_str.to_string()))?;
    let peer_id = PeerId::from(next_field(&mut rest).ok_or(LineError::Missing("peer id"))?);
    let name = next_field(&mut rest)
        .ok_or(LineError::Missing("peer name"))?
        .to_string();
    let event = match kind {
        EventKind::Enter => {
            let address = next_field(&mut rest)
                .ok_or(LineError::Missing("address"))?
                .to_string();
            let mut headers = HashMap::new();
            while let Some(pair) = next_field(&mut rest) {
                let (k, v) = pair
                    .split_once('=')
                    .filter(|(k, _)| !k.is_empty())
                    .ok_or_else(|| LineError::BadHeader(pair.to_string()))?;
                headers.insert(k.to_string(), v.to_string());
            }
            TransportEvent::Enter {
                peer_id,
                name,
                address,
                headers,
            }
        }
        EventKind::Join | EventKind::Leave => {
            let group = next_field(&mut rest)
                .ok_or(LineError::Missing("group"))?
                .to_string();
            if kind == EventKind::Join {
                TransportEvent::Join {
                    peer_id,
                    name,
                    group,
                }
            } else {
                TransportEvent::Leave {
                    peer_id,
                    name,
                    group,
                }
            }
        }
        EventKind::Shout => {
            let group = next_field(&mut rest)
                .ok_or(LineError::Missing("group"))?
                .to_string();
            TransportEvent::Shout {
                peer_id,
                name,
                group,
                payload: remainder(rest, "message")?.as_bytes().to_vec(),
            }
        }
        EventKind::Whisper => TransportEvent::Whisper {
            peer_id,
            name,
            payload: remainder(rest, "message")?.as_bytes().to_vec(),
        },
        EventKind::Exit => TransportEvent::Exit { peer_id, name },
    };
    Ok(Some(Line::Event(event)))
}

fn parse_operator(line: &str) -> Result<OperatorCommand, LineError> {
    let mut rest = line;
    let verb = next_field(&mut rest).ok_or(LineError::Missing("operator command"))?;
    match verb {
        "SEND" => {
            let target = next_field(&mut rest).ok_or(LineError::Missing("target peer"))?;
            Ok(OperatorCommand::Send {
                target: PeerId::from(target),
                text: remainder(rest, "command text")?.to_string(),
            })
        }
        "TIMELINE" => Ok(OperatorCommand::Timeline(
            remainder(rest, "timeline state")?.to_string(),
        )),
        "ABANDON" => Ok(OperatorCommand::Abandon(
            next_field(&mut rest)
                .ok_or(LineError::Missing("command name"))?
                .to_string(),
        )),
        other => Err(LineError::UnknownOperator(other.to_string())),
    }
}

/// Pop the next whitespace-delimited token.
fn next_field<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let s = rest.trim_start();
    if s.is_empty() {
        *rest = s;
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    let (field, tail) = s.split_at(end);
    *rest = tail;
    Some(field)
}

/// Everything after the separator following the last token, kept verbatim.
fn remainder<'a>(rest: &'a str, what: &'static str) -> Result<&'a str, LineError> {
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_whitespace() && !chars.as_str().is_empty() => Ok(chars.as_str()),
        _ => Err(LineError::Missing(what)),
    }
}

/// Parse one raw input line. Shout/whisper text may be any bytes; the rest of the line must be UTF-8.
pub fn parse_raw_line(raw: &[u8]) -> Result<Option<Line>, LineError> {
    let mut end = raw.len();
    while end > 0 && matches!(raw[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    let raw = &raw[..end];
    if let Ok(text) = std::str::from_utf8(raw) {
        return parse_line(text);
    }
    let lossy = String::from_utf8_lossy(raw);
    let mut line = parse_line(&lossy)?;
    let payload = match &mut line {
        Some(Line::Event(TransportEvent::Shout { payload, .. }))
        | Some(Line::Event(TransportEvent::Whisper { payload, .. })) => payload,
        _ => return Err(LineError::NotText),
    };
    let head = lossy.len() - payload.len();
    match (raw.get(..head), raw.get(head..)) {
        (Some(h), Some(tail)) if h == &lossy.as_bytes()[..head] => *payload = tail.to_vec(),
        _ => return Err(LineError::NotText),
    }
    Ok(line)
}

/// Read lines until EOF or until the consumer goes away. Bad lines are logged and skipped.
/// Returns the number of lines forwarded.
pub async fn read_lines<R>(mut reader: R, tx: mpsc::Sender<Line>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut forwarded = 0usize;
    let mut number = 0usize;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        number += 1;
        match parse_raw_line(&buf) {
            Ok(Some(line)) => {
                if tx.send(line).await.is_err() {
                    tracing::debug!("consumer closed, stop reading");
                    break;
                }
                forwarded += 1;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(line = number, error = %e, "skipping input line"),
        }
    }
    Ok(forwarded)
}
