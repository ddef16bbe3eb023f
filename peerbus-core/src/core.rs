//! Host-driven API: NetworkCore receives transport events from host, returns notifications and actions.

use std::collections::{BTreeSet, HashMap};

use crate::config::{ConfigError, CoreConfig};
use crate::correlator::{CommandCorrelator, CorrelatedCommand};
use crate::peer::{header, PeerId, Role, RoleSet};
use crate::protocol::{AgentState, ProtocolEvent};
use crate::registry::PeerRegistry;
use crate::router::{MessageRouter, Notification};
use crate::transport::{Delivery, OutboundAction, TransportEvent};
use crate::wire;

/// Main coordinator. Owns the registry; runs on the single delivery context.
pub struct NetworkCore {
    group: String,
    advertised: RoleSet,
    registry: PeerRegistry,
    router: MessageRouter,
    correlator: CommandCorrelator,
}

impl NetworkCore {
    pub fn new() -> Self {
        Self::from_valid_config(CoreConfig::default())
    }

    pub fn with_config(config: CoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: CoreConfig) -> Self {
        Self {
            advertised: config.advertised_roles(),
            router: MessageRouter::new(config.tracked_role_set()),
            correlator: CommandCorrelator::new(config.correlated_commands),
            registry: PeerRegistry::new(),
            group: config.group,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Headers this process publishes on join so peers can classify it.
    pub fn service_headers(&self) -> HashMap<String, String> {
        self.advertised
            .iter()
            .filter_map(|r| r.header_key())
            .map(|k| (k.to_string(), header::TRUE.to_string()))
            .collect()
    }

    /// Process one transport event.
    pub fn on_transport_event(&mut self, event: TransportEvent) -> Vec<Notification> {
        match event {
            TransportEvent::Enter {
                peer_id,
                name,
                address,
                headers,
            } => self.on_peer_enter(peer_id, &name, &address, &headers),
            TransportEvent::Join {
                peer_id,
                name,
                group,
            } => {
                tracing::debug!(peer = %peer_id, %name, %group, "peer joined group");
                Vec::new()
            }
            TransportEvent::Leave {
                peer_id,
                name,
                group,
            } => {
                tracing::debug!(peer = %peer_id, %name, %group, "peer left group");
                Vec::new()
            }
            TransportEvent::Shout {
                peer_id,
                name,
                group,
                payload,
            } => self.on_message_received(&peer_id, &name, &Delivery::Shout { group }, &payload),
            TransportEvent::Whisper {
                peer_id,
                name,
                payload,
            } => self.on_message_received(&peer_id, &name, &Delivery::Whisper, &payload),
            TransportEvent::Exit { peer_id, name } => self.on_peer_exit(&peer_id, &name),
        }
    }

    /// Peer entered. Registers (or replaces) its record.
    pub fn on_peer_enter(
        &mut self,
        peer_id: PeerId,
        name: &str,
        address: &str,
        headers: &HashMap<String, String>,
    ) -> Vec<Notification> {
        tracing::debug!(peer = %peer_id, name, address, "peer entered");
        self.registry
            .on_peer_enter(peer_id.clone(), name, address, headers);
        match self.registry.get(&peer_id) {
            Some(record) => self.router.route_enter(record),
            None => Vec::new(),
        }
    }

    /// Peer exited. Role-scoped notifications are computed before eviction. Unknown peers only get the generic exit.
    /// Commands still waiting on the peer are released.
    pub fn on_peer_exit(&mut self, peer_id: &PeerId, name: &str) -> Vec<Notification> {
        tracing::debug!(peer = %peer_id, name, "peer exited");
        let mut out = self.router.route_exit(&self.registry, peer_id, name);
        self.registry.on_peer_exit(peer_id);
        for command in self.correlator.abandon_for_peer(peer_id) {
            tracing::warn!(peer = %peer_id, command = %command.command_text, "peer exited with command pending");
            out.push(Notification::CommandAbandoned {
                peer_id: peer_id.clone(),
                command,
            });
        }
        out
    }

    /// Decode and route one received frame. Unregistered senders are routed with role Unknown.
    pub fn on_message_received(
        &mut self,
        peer_id: &PeerId,
        name: &str,
        delivery: &Delivery,
        payload: &[u8],
    ) -> Vec<Notification> {
        let event = match wire::decode_frame(payload) {
            Ok(event) => event,
            Err(e) => {
                let text = String::from_utf8_lossy(payload).into_owned();
                tracing::debug!(peer = %peer_id, error = %e, "undecodable frame");
                return vec![self.router.diagnostic(peer_id, name, text, "payload is not text")];
            }
        };
        if let ProtocolEvent::AgentStateChanged(AgentState::CanBeFrozen(b)) = &event {
            self.registry.set_can_be_frozen(peer_id, *b);
        }
        self.router.route_message(
            &self.registry,
            &mut self.correlator,
            peer_id,
            name,
            delivery,
            event,
        )
    }

    /// Send a command to one peer. Empty target/text or a same-named pending command drops it (logged).
    pub fn send_command(&mut self, target: &PeerId, command_text: &str) -> Vec<OutboundAction> {
        self.correlator
            .send_command(target, command_text)
            .into_iter()
            .collect()
    }

    /// Stop waiting for the reply to a correlated command.
    pub fn abandon_command(&mut self, name: &str) -> Option<CorrelatedCommand> {
        self.correlator.abandon(name)
    }

    /// Broadcast the timeline state to the group.
    pub fn broadcast_timeline_state(&self, state: &str) -> OutboundAction {
        self.broadcast(&ProtocolEvent::TimelineStateUpdated(state.to_string()))
    }

    /// Broadcast a state change about this process to the group.
    pub fn broadcast_agent_state(&self, state: AgentState) -> OutboundAction {
        self.broadcast(&ProtocolEvent::AgentStateChanged(state))
    }

    /// Send an agent definition to one peer.
    pub fn publish_definition(&self, target: &PeerId, json: &str) -> OutboundAction {
        Self::send_to(target, &ProtocolEvent::DefinitionReceived(json.to_string()))
    }

    /// Send an agent mapping to one peer.
    pub fn publish_mapping(&self, target: &PeerId, json: &str) -> OutboundAction {
        Self::send_to(target, &ProtocolEvent::MappingReceived(json.to_string()))
    }

    fn broadcast(&self, event: &ProtocolEvent) -> OutboundAction {
        OutboundAction::Broadcast {
            group: self.group.clone(),
            text: wire::encode(event),
        }
    }

    fn send_to(target: &PeerId, event: &ProtocolEvent) -> OutboundAction {
        OutboundAction::SendTo {
            peer_id: target.clone(),
            text: wire::encode(event),
        }
    }

    pub fn role_of(&self, peer_id: &PeerId) -> Role {
        self.registry.role_of(peer_id)
    }

    pub fn peers_with_role(&self, role: Role) -> BTreeSet<PeerId> {
        self.registry.peers_with_role(role)
    }

    /// Processes on the bus with `role`, counting this one when it advertises the role.
    pub fn count_of(&self, role: Role) -> usize {
        let own = usize::from(role != Role::Unknown && self.advertised.contains(role));
        self.registry.peers_with_role(role).len() + own
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn correlator(&self) -> &CommandCorrelator {
        &self.correlator
    }
}

impl Default for NetworkCore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{load_platform_from_path, LOAD_PLATFORM_FROM_PATH};
    use crate::transport::RecordingTransport;

    fn enter(peer: &str, name: &str, headers: &[(&str, &str)]) -> TransportEvent {
        TransportEvent::Enter {
            peer_id: PeerId::from(peer),
            name: name.to_string(),
            address: "tcp://10.0.0.17:49153".to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn whisper(peer: &str, text: &str) -> TransportEvent {
        TransportEvent::Whisper {
            peer_id: PeerId::from(peer),
            name: peer.to_string(),
            payload: text.as_bytes().to_vec(),
        }
    }

    fn exit(peer: &str) -> TransportEvent {
        TransportEvent::Exit {
            peer_id: PeerId::from(peer),
            name: peer.to_string(),
        }
    }

    #[test]
    fn editor_lifecycle() {
        let mut core = NetworkCore::new();
        let out = core.on_transport_event(enter("ed", "Editor", &[("isEditor", "1"), ("hostname", "h1")]));
        assert!(out.iter().any(|n| matches!(
            n,
            Notification::RoleEntered { role: Role::Editor, ip_address, hostname, .. }
                if ip_address == "10.0.0.17" && hostname == "h1"
        )));
        assert_eq!(core.role_of(&PeerId::from("ed")), Role::Editor);

        let out = core.on_transport_event(exit("ed"));
        assert!(out
            .iter()
            .any(|n| matches!(n, Notification::RoleExited { role: Role::Editor, .. })));
        assert!(out.iter().any(|n| matches!(n, Notification::PeerExited { .. })));
        assert_eq!(core.role_of(&PeerId::from("ed")), Role::Unknown);
        assert!(core.peers_with_role(Role::Editor).is_empty());
    }

    #[test]
    fn exit_twice_is_harmless() {
        let mut core = NetworkCore::new();
        core.on_transport_event(enter("ed", "Editor", &[("isEditor", "1")]));
        core.on_transport_event(exit("ed"));
        let out = core.on_transport_event(exit("ed"));
        assert_eq!(
            out,
            vec![Notification::PeerExited {
                peer_id: PeerId::from("ed"),
                name: "ed".to_string(),
            }]
        );
    }

    #[test]
    fn load_platform_round_trip() {
        let mut core = NetworkCore::new();
        core.on_transport_event(enter("ed", "Editor", &[("isEditor", "1")]));
        let editor = PeerId::from("ed");
        let actions = core.send_command(&editor, &load_platform_from_path("/tmp/x.json"));
        let mut transport = RecordingTransport::default();
        for a in &actions {
            a.dispatch(&mut transport);
        }
        assert_eq!(
            transport.calls,
            vec![OutboundAction::SendTo {
                peer_id: editor.clone(),
                text: "LOAD_PLATFORM_FROM_PATH=/tmp/x.json".to_string(),
            }]
        );

        let out = core.on_transport_event(whisper("ed", "LOAD_PLATFORM_FROM_PATH=/tmp/x.json STATUS=0"));
        match out.as_slice() {
            [Notification::CommandReplied { role, reply }] => {
                assert_eq!(*role, Role::Editor);
                assert!(!reply.success);
                assert_eq!(reply.params, "/tmp/x.json");
                assert!(reply.command.is_some());
            }
            other => panic!("expected CommandReplied, got {other:?}"),
        }
        assert!(core.correlator().pending(LOAD_PLATFORM_FROM_PATH).is_none());
    }

    #[test]
    fn empty_target_sends_nothing() {
        let mut core = NetworkCore::new();
        let actions = core.send_command(&PeerId::from(""), "LOAD_PLATFORM_FROM_PATH=/x");
        let mut transport = RecordingTransport::default();
        for a in &actions {
            a.dispatch(&mut transport);
        }
        assert!(actions.is_empty());
        assert!(transport.calls.is_empty());
    }

    #[test]
    fn message_from_unregistered_peer_still_routed() {
        let mut core = NetworkCore::new();
        let out = core.on_transport_event(whisper("ghost", "MAPPING={\"m\":1}"));
        assert_eq!(
            out,
            vec![Notification::MappingReceived {
                peer_id: PeerId::from("ghost"),
                name: "ghost".to_string(),
                json: "{\"m\":1}".to_string(),
            }]
        );
    }

    #[test]
    fn binary_payload_is_diagnostic() {
        let mut core = NetworkCore::new();
        let out = core.on_transport_event(TransportEvent::Whisper {
            peer_id: PeerId::from("p"),
            name: "p".to_string(),
            payload: vec![0xff, 0x00, 0xfe],
        });
        assert!(matches!(
            out.as_slice(),
            [Notification::Diagnostic { reason: "payload is not text", .. }]
        ));
    }

    #[test]
    fn can_be_frozen_broadcast_updates_registry() {
        let mut core = NetworkCore::new();
        core.on_transport_event(enter("agent", "Agent", &[]));
        let out = core.on_transport_event(TransportEvent::Shout {
            peer_id: PeerId::from("agent"),
            name: "Agent".to_string(),
            group: "INGESCAPE_PRIVATE".to_string(),
            payload: b"CANBEFROZEN=1".to_vec(),
        });
        assert!(matches!(
            out.as_slice(),
            [Notification::AgentStateChanged { state: AgentState::CanBeFrozen(true), .. }]
        ));
        assert!(core.registry().get(&PeerId::from("agent")).unwrap().can_be_frozen);
    }

    #[test]
    fn re_enter_keeps_single_record() {
        let mut core = NetworkCore::new();
        core.on_transport_event(enter("ed", "Editor", &[("isEditor", "1"), ("hostname", "h1")]));
        core.on_transport_event(enter("ed", "Editor", &[("isEditor", "1"), ("hostname", "h2")]));
        assert_eq!(core.peers_with_role(Role::Editor).len(), 1);
        assert_eq!(core.registry().get(&PeerId::from("ed")).unwrap().hostname, "h2");
    }

    #[test]
    fn counts_include_self_when_advertised() {
        let mut core = NetworkCore::new();
        assert_eq!(core.count_of(Role::ExperimentRunner), 1);
        core.on_transport_event(enter("x2", "Expe", &[("isExpe", "1")]));
        assert_eq!(core.count_of(Role::ExperimentRunner), 2);
        assert_eq!(core.count_of(Role::Editor), 0);
    }

    #[test]
    fn service_headers_follow_config() {
        let core = NetworkCore::with_config(CoreConfig {
            advertise: vec![Role::Editor, Role::Recorder],
            ..CoreConfig::default()
        })
        .unwrap();
        let h = core.service_headers();
        assert_eq!(h.get("isEditor").map(String::as_str), Some("1"));
        assert_eq!(h.get("isRecorder").map(String::as_str), Some("1"));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn invalid_config_rejected() {
        let cfg = CoreConfig {
            group: String::new(),
            ..CoreConfig::default()
        };
        assert!(matches!(
            NetworkCore::with_config(cfg),
            Err(ConfigError::EmptyGroup)
        ));
    }

    #[test]
    fn outbound_helpers_encode_wire_text() {
        let core = NetworkCore::new();
        assert_eq!(
            core.broadcast_timeline_state("PLAYING"),
            OutboundAction::Broadcast {
                group: "INGESCAPE_PRIVATE".to_string(),
                text: "TIMELINE_STATE=PLAYING".to_string(),
            }
        );
        assert_eq!(
            core.broadcast_agent_state(AgentState::Muted(true)),
            OutboundAction::Broadcast {
                group: "INGESCAPE_PRIVATE".to_string(),
                text: "MUTED=1".to_string(),
            }
        );
        assert_eq!(
            core.publish_definition(&PeerId::from("p"), "{}"),
            OutboundAction::SendTo {
                peer_id: PeerId::from("p"),
                text: "DEFINITION={}".to_string(),
            }
        );
        assert_eq!(
            core.publish_mapping(&PeerId::from("p"), "{}"),
            OutboundAction::SendTo {
                peer_id: PeerId::from("p"),
                text: "MAPPING={}".to_string(),
            }
        );
    }

    #[test]
    fn abandon_releases_pending() {
        let mut core = NetworkCore::new();
        let ed = PeerId::from("ed");
        assert_eq!(core.send_command(&ed, "LOAD_PLATFORM_FROM_PATH=/a").len(), 1);
        assert!(core.send_command(&ed, "LOAD_PLATFORM_FROM_PATH=/b").is_empty());
        assert!(core.abandon_command(LOAD_PLATFORM_FROM_PATH).is_some());
        assert_eq!(core.send_command(&ed, "LOAD_PLATFORM_FROM_PATH=/b").len(), 1);
    }

    #[test]
    fn target_exit_releases_pending_command() {
        let mut core = NetworkCore::new();
        core.on_transport_event(enter("ed1", "Editor", &[("isEditor", "1")]));
        let ed1 = PeerId::from("ed1");
        assert_eq!(core.send_command(&ed1, "LOAD_PLATFORM_FROM_PATH=/a").len(), 1);

        let out = core.on_transport_event(exit("ed1"));
        assert!(out.iter().any(|n| matches!(
            n,
            Notification::CommandAbandoned { peer_id, command }
                if *peer_id == ed1 && command.command_text == "LOAD_PLATFORM_FROM_PATH=/a"
        )));
        assert!(core.correlator().pending(LOAD_PLATFORM_FROM_PATH).is_none());

        core.on_transport_event(enter("ed2", "Editor", &[("isEditor", "1")]));
        let actions = core.send_command(&PeerId::from("ed2"), "LOAD_PLATFORM_FROM_PATH=/a");
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn other_peer_exit_keeps_pending_command() {
        let mut core = NetworkCore::new();
        core.on_transport_event(enter("ed", "Editor", &[("isEditor", "1")]));
        core.on_transport_event(enter("rec", "Recorder", &[("isRecorder", "1")]));
        core.send_command(&PeerId::from("ed"), "LOAD_PLATFORM_FROM_PATH=/a");
        let out = core.on_transport_event(exit("rec"));
        assert!(!out.iter().any(|n| matches!(n, Notification::CommandAbandoned { .. })));
        assert!(core.correlator().pending(LOAD_PLATFORM_FROM_PATH).is_some());
    }
}
