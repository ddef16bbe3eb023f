//! Transport adapter contract: inbound presence/message events and the two outbound primitives.
//!
//! The group-messaging transport itself lives outside this crate. Hosts convert its callbacks into
//! [`TransportEvent`]s and execute the [`OutboundAction`]s the core returns.

use std::collections::HashMap;
use std::fmt;

use crate::peer::PeerId;

/// Kind of a transport event.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EventKind {
    Enter,
    Join,
    Leave,
    Shout,
    Whisper,
    Exit,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Enter => "ENTER",
            EventKind::Join => "JOIN",
            EventKind::Leave => "LEAVE",
            EventKind::Shout => "SHOUT",
            EventKind::Whisper => "WHISPER",
            EventKind::Exit => "EXIT",
        }
    }

    pub fn parse(s: &str) -> Option<EventKind> {
        match s {
            "ENTER" => Some(EventKind::Enter),
            "JOIN" => Some(EventKind::Join),
            "LEAVE" => Some(EventKind::Leave),
            "SHOUT" => Some(EventKind::Shout),
            "WHISPER" => Some(EventKind::Whisper),
            "EXIT" => Some(EventKind::Exit),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound event from the transport. Events for a single peer arrive in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Enter {
        peer_id: PeerId,
        name: String,
        /// `scheme://ip:port`
        address: String,
        headers: HashMap<String, String>,
    },
    Join {
        peer_id: PeerId,
        name: String,
        group: String,
    },
    Leave {
        peer_id: PeerId,
        name: String,
        group: String,
    },
    /// Broadcast to a group. Payload is the raw frame.
    Shout {
        peer_id: PeerId,
        name: String,
        group: String,
        payload: Vec<u8>,
    },
    /// Point-to-point message.
    Whisper {
        peer_id: PeerId,
        name: String,
        payload: Vec<u8>,
    },
    Exit {
        peer_id: PeerId,
        name: String,
    },
}

impl TransportEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TransportEvent::Enter { .. } => EventKind::Enter,
            TransportEvent::Join { .. } => EventKind::Join,
            TransportEvent::Leave { .. } => EventKind::Leave,
            TransportEvent::Shout { .. } => EventKind::Shout,
            TransportEvent::Whisper { .. } => EventKind::Whisper,
            TransportEvent::Exit { .. } => EventKind::Exit,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        match self {
            TransportEvent::Enter { peer_id, .. }
            | TransportEvent::Join { peer_id, .. }
            | TransportEvent::Leave { peer_id, .. }
            | TransportEvent::Shout { peer_id, .. }
            | TransportEvent::Whisper { peer_id, .. }
            | TransportEvent::Exit { peer_id, .. } => peer_id,
        }
    }
}

/// How a message reached us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Shout { group: String },
    Whisper,
}

/// Outbound primitives of the transport. Both are fire-and-forget.
pub trait Transport {
    fn broadcast(&mut self, group: &str, text: &str);
    fn send_to(&mut self, peer_id: &PeerId, text: &str);
}

/// Action for the host to perform on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    Broadcast { group: String, text: String },
    SendTo { peer_id: PeerId, text: String },
}

impl OutboundAction {
    /// Hand the action to a transport.
    pub fn dispatch<T: Transport + ?Sized>(&self, transport: &mut T) {
        match self {
            OutboundAction::Broadcast { group, text } => transport.broadcast(group, text),
            OutboundAction::SendTo { peer_id, text } => transport.send_to(peer_id, text),
        }
    }
}

/// Records every outbound call instead of sending it.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    pub calls: Vec<OutboundAction>,
}

#[cfg(test)]
impl Transport for RecordingTransport {
    fn broadcast(&mut self, group: &str, text: &str) {
        self.calls.push(OutboundAction::Broadcast {
            group: group.to_string(),
            text: text.to_string(),
        });
    }

    fn send_to(&mut self, peer_id: &PeerId, text: &str) {
        self.calls.push(OutboundAction::SendTo {
            peer_id: peer_id.clone(),
            text: text.to_string(),
        });
    }
}
