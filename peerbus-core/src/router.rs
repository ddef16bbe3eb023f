//! Message router: turns decoded events and presence changes into upstream notifications.
//!
//! Stateless per event. Peer roles are read from the registry at dispatch time.

use crate::correlator::{CommandCorrelator, CommandReply, CorrelatedCommand};
use crate::peer::{PeerId, PeerRecord, Role, RoleSet};
use crate::protocol::{AgentState, CommandStatus, ProtocolEvent};
use crate::registry::PeerRegistry;
use crate::transport::Delivery;
use crate::wire::encode;

/// Notification for the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    PeerEntered {
        peer_id: PeerId,
        name: String,
        role: Role,
    },
    /// A peer with a tracked role entered. Emitted once per tracked role it advertises.
    RoleEntered {
        role: Role,
        peer_id: PeerId,
        name: String,
        ip_address: String,
        hostname: String,
    },
    PeerExited {
        peer_id: PeerId,
        name: String,
    },
    /// A peer with a tracked role exited, in addition to `PeerExited`.
    RoleExited {
        role: Role,
        peer_id: PeerId,
        name: String,
    },
    DefinitionReceived {
        peer_id: PeerId,
        name: String,
        json: String,
    },
    MappingReceived {
        peer_id: PeerId,
        name: String,
        json: String,
    },
    TimelineStateUpdated {
        peer_id: PeerId,
        state: String,
    },
    AgentStateChanged {
        peer_id: PeerId,
        name: String,
        state: AgentState,
    },
    /// Status of a command nobody correlates.
    CommandStatusReceived {
        peer_id: PeerId,
        role: Role,
        status: CommandStatus,
    },
    /// Status reply matched by the correlator.
    CommandReplied { role: Role, reply: CommandReply },
    /// A pending command was released because its target peer exited.
    CommandAbandoned {
        peer_id: PeerId,
        command: CorrelatedCommand,
    },
    /// Anything not understood. Informational only.
    Diagnostic {
        peer_id: PeerId,
        name: String,
        text: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Default)]
pub struct MessageRouter {
    tracked_roles: RoleSet,
}

impl MessageRouter {
    pub fn new(tracked_roles: RoleSet) -> Self {
        Self { tracked_roles }
    }

    /// Notifications for a freshly registered peer.
    pub fn route_enter(&self, record: &PeerRecord) -> Vec<Notification> {
        let mut out = vec![Notification::PeerEntered {
            peer_id: record.peer_id.clone(),
            name: record.display_name.clone(),
            role: record.role(),
        }];
        for role in record.roles.iter().filter(|r| self.tracked_roles.contains(*r)) {
            tracing::info!(peer = %record.peer_id, name = %record.display_name, %role, "tracked peer entered");
            out.push(Notification::RoleEntered {
                role,
                peer_id: record.peer_id.clone(),
                name: record.display_name.clone(),
                ip_address: record.ip_address.clone(),
                hostname: record.hostname.clone(),
            });
        }
        out
    }

    /// Notifications for an EXIT. Call before the registry evicts the peer.
    pub fn route_exit(
        &self,
        registry: &PeerRegistry,
        peer_id: &PeerId,
        name: &str,
    ) -> Vec<Notification> {
        let mut out = Vec::new();
        if let Some(record) = registry.get(peer_id) {
            for role in record.roles.iter().filter(|r| self.tracked_roles.contains(*r)) {
                tracing::info!(peer = %peer_id, name, %role, "tracked peer exited");
                out.push(Notification::RoleExited {
                    role,
                    peer_id: peer_id.clone(),
                    name: name.to_string(),
                });
            }
        }
        out.push(Notification::PeerExited {
            peer_id: peer_id.clone(),
            name: name.to_string(),
        });
        out
    }

    /// Route one decoded message. Correlated command statuses go to `correlator` only.
    pub fn route_message(
        &self,
        registry: &PeerRegistry,
        correlator: &mut CommandCorrelator,
        peer_id: &PeerId,
        name: &str,
        delivery: &Delivery,
        event: ProtocolEvent,
    ) -> Vec<Notification> {
        let notification = match event {
            ProtocolEvent::DefinitionReceived(json) => Notification::DefinitionReceived {
                peer_id: peer_id.clone(),
                name: name.to_string(),
                json,
            },
            ProtocolEvent::MappingReceived(json) => Notification::MappingReceived {
                peer_id: peer_id.clone(),
                name: name.to_string(),
                json,
            },
            ProtocolEvent::TimelineStateUpdated(state) => Notification::TimelineStateUpdated {
                peer_id: peer_id.clone(),
                state,
            },
            ProtocolEvent::AgentStateChanged(state) => Notification::AgentStateChanged {
                peer_id: peer_id.clone(),
                name: name.to_string(),
                state,
            },
            ProtocolEvent::CommandStatusReceived(status) => {
                let role = registry.role_of(peer_id);
                if !correlator.is_correlated(&status.name) {
                    Notification::CommandStatusReceived {
                        peer_id: peer_id.clone(),
                        role,
                        status,
                    }
                } else if *delivery != Delivery::Whisper {
                    return vec![self.diagnostic(
                        peer_id,
                        name,
                        encode(&ProtocolEvent::CommandStatusReceived(status)),
                        "correlated status reply was broadcast",
                    )];
                } else {
                    match correlator.on_reply(peer_id, status) {
                        Some(reply) => Notification::CommandReplied { role, reply },
                        None => return Vec::new(),
                    }
                }
            }
            ProtocolEvent::UnknownMessage(text) => {
                return vec![self.diagnostic(peer_id, name, text, "unrecognized message")];
            }
        };
        vec![notification]
    }

    /// Diagnostic for anything not understood; logged at warn.
    pub fn diagnostic(
        &self,
        peer_id: &PeerId,
        name: &str,
        text: String,
        reason: &'static str,
    ) -> Notification {
        tracing::warn!(peer = %peer_id, name, text = %text, reason, "message not handled");
        Notification::Diagnostic {
            peer_id: peer_id.clone(),
            name: name.to_string(),
            text,
            reason,
        }
    }
}
