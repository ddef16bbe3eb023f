//! Peer presence and command protocol layer for agents on a group-messaging bus.
//! Host-driven: no I/O; host passes transport events and receives notifications and actions.

pub mod config;
pub mod core;
pub mod correlator;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod transport;
pub mod wire;

pub use self::core::NetworkCore;
pub use config::{ConfigError, CoreConfig};
pub use correlator::{CommandCorrelator, CommandReply, CorrelatedCommand, SendError};
pub use peer::{PeerId, PeerRecord, Role, RoleSet};
pub use protocol::{AgentState, CommandStatus, ProtocolEvent};
pub use registry::PeerRegistry;
pub use router::{MessageRouter, Notification};
pub use transport::{Delivery, EventKind, OutboundAction, Transport, TransportEvent};
pub use wire::{decode, decode_frame, encode, encode_frame, FrameDecodeError};
