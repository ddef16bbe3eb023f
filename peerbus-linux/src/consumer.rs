//! Single consumer task: drains the ordered event channel into the core and executes its actions.

use std::io::Write;

use peerbus_core::protocol::definition_name;
use peerbus_core::{NetworkCore, Notification, OutboundAction, PeerId, Transport};
use tokio::sync::mpsc;

use crate::replay::{Line, OperatorCommand};

/// Transport that writes outbound traffic as text lines: `SHOUT <group> <text>` / `WHISPER <peer> <text>`.
pub struct LineTransport<W: Write> {
    out: W,
}

impl<W: Write> LineTransport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, kind: &str, target: &str, text: &str) {
        if let Err(e) = writeln!(self.out, "{} {} {}", kind, target, text).and_then(|_| self.out.flush()) {
            tracing::warn!(error = %e, "failed to write outbound message");
        }
    }
}

impl<W: Write> Transport for LineTransport<W> {
    fn broadcast(&mut self, group: &str, text: &str) {
        self.emit("SHOUT", group, text);
    }

    fn send_to(&mut self, peer_id: &PeerId, text: &str) {
        self.emit("WHISPER", peer_id.as_str(), text);
    }
}

/// Run until the channel closes. Returns the core for inspection.
pub async fn run_consumer<T: Transport>(
    mut core: NetworkCore,
    mut rx: mpsc::Receiver<Line>,
    transport: &mut T,
) -> NetworkCore {
    while let Some(line) = rx.recv().await {
        match line {
            Line::Event(event) => {
                tracing::trace!(kind = %event.kind(), peer = %event.peer_id(), "bus event");
                for n in core.on_transport_event(event) {
                    log_notification(&n);
                }
            }
            Line::Operator(cmd) => {
                for action in execute(&mut core, cmd) {
                    action.dispatch(&mut *transport);
                }
            }
        }
    }
    tracing::info!(peers = core.registry().len(), "event channel closed");
    core
}

fn execute(core: &mut NetworkCore, cmd: OperatorCommand) -> Vec<OutboundAction> {
    match cmd {
        OperatorCommand::Send { target, text } => core.send_command(&target, &text),
        OperatorCommand::Timeline(state) => vec![core.broadcast_timeline_state(&state)],
        OperatorCommand::Abandon(name) => {
            match core.abandon_command(&name) {
                Some(c) => tracing::info!(command = %c.command_text, peer = %c.target, "command abandoned"),
                None => tracing::info!(%name, "no pending command to abandon"),
            }
            Vec::new()
        }
    }
}

fn log_notification(n: &Notification) {
    match n {
        Notification::PeerEntered {
            peer_id,
            name,
            role,
        } => tracing::info!(peer = %peer_id, %name, %role, "peer entered"),
        Notification::RoleEntered {
            role,
            peer_id,
            name,
            ip_address,
            hostname,
        } => tracing::info!(peer = %peer_id, %name, %role, %ip_address, %hostname, "role entered"),
        Notification::PeerExited { peer_id, name } => {
            tracing::info!(peer = %peer_id, %name, "peer exited")
        }
        Notification::RoleExited {
            role,
            peer_id,
            name,
        } => tracing::info!(peer = %peer_id, %name, %role, "role exited"),
        Notification::DefinitionReceived {
            peer_id,
            name,
            json,
        } => match definition_name(json) {
            Ok(agent) => tracing::info!(peer = %peer_id, %name, %agent, "definition received"),
            Err(e) => tracing::warn!(peer = %peer_id, %name, error = %e, "definition received"),
        },
        Notification::MappingReceived { peer_id, name, json } => {
            tracing::info!(peer = %peer_id, %name, bytes = json.len(), "mapping received")
        }
        Notification::TimelineStateUpdated { peer_id, state } => {
            tracing::info!(peer = %peer_id, %state, "timeline state")
        }
        Notification::AgentStateChanged {
            peer_id,
            name,
            state,
        } => tracing::info!(peer = %peer_id, %name, ?state, "agent state"),
        Notification::CommandStatusReceived {
            peer_id,
            role,
            status,
        } => tracing::info!(
            peer = %peer_id,
            %role,
            command = %status.name,
            params = %status.params,
            success = status.success,
            "command status"
        ),
        Notification::CommandReplied { role, reply } => tracing::info!(
            peer = %reply.from,
            %role,
            command = %reply.name,
            params = %reply.params,
            success = reply.success,
            pending = reply.command.is_some(),
            "command replied"
        ),
        // Already logged by the core and router.
        Notification::CommandAbandoned { .. } | Notification::Diagnostic { .. } => {}
    }
}
