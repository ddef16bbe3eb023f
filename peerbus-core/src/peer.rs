//! Peer identity and metadata: peer ID, roles, and the record built from ENTER headers.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

/// Header keys a peer advertises on join.
pub mod header {
    pub const IS_EDITOR: &str = "isEditor";
    pub const IS_LAUNCHER: &str = "isLauncher";
    pub const IS_RECORDER: &str = "isRecorder";
    pub const IS_ASSESSMENTS: &str = "isAssessments";
    pub const IS_EXPE: &str = "isExpe";
    pub const HOSTNAME: &str = "hostname";
    pub const CAN_BE_FROZEN: &str = "canBeFrozen";
    pub const COMMAND_LINE: &str = "commandline";
    pub const LOGGER: &str = "logger";
    pub const VIDEO_STREAM: &str = "videoStream";

    /// Value of a boolean header that is set.
    pub const TRUE: &str = "1";
}

/// Transport-assigned peer identifier. Opaque; unique for the lifetime of one connection.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        PeerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        PeerId(s)
    }
}

/// Application-level classification of a peer, derived from its boolean headers.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Editor,
    Launcher,
    Recorder,
    Assessments,
    ExperimentRunner,
    Unknown,
}

impl Role {
    /// Known roles in precedence order (first wins when a peer advertises several).
    pub const KNOWN: [Role; 5] = [
        Role::Editor,
        Role::Launcher,
        Role::Recorder,
        Role::Assessments,
        Role::ExperimentRunner,
    ];

    /// Header key that advertises this role. None for Unknown.
    pub fn header_key(self) -> Option<&'static str> {
        match self {
            Role::Editor => Some(header::IS_EDITOR),
            Role::Launcher => Some(header::IS_LAUNCHER),
            Role::Recorder => Some(header::IS_RECORDER),
            Role::Assessments => Some(header::IS_ASSESSMENTS),
            Role::ExperimentRunner => Some(header::IS_EXPE),
            Role::Unknown => None,
        }
    }

    pub fn from_header_key(key: &str) -> Option<Role> {
        Role::KNOWN
            .into_iter()
            .find(|r| r.header_key() == Some(key))
    }

    fn bit(self) -> u8 {
        match self {
            Role::Editor => 1 << 0,
            Role::Launcher => 1 << 1,
            Role::Recorder => 1 << 2,
            Role::Assessments => 1 << 3,
            Role::ExperimentRunner => 1 << 4,
            Role::Unknown => 0,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Editor => "editor",
            Role::Launcher => "launcher",
            Role::Recorder => "recorder",
            Role::Assessments => "assessments",
            Role::ExperimentRunner => "experiment_runner",
            Role::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Set of known roles. A peer may advertise more than one; an empty set means Unknown.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub struct RoleSet(u8);

impl RoleSet {
    pub fn empty() -> Self {
        RoleSet(0)
    }

    /// Adding Unknown is a no-op.
    pub fn insert(&mut self, role: Role) {
        self.0 |= role.bit();
    }

    /// Unknown is contained only by the empty set.
    pub fn contains(&self, role: Role) -> bool {
        match role {
            Role::Unknown => self.is_empty(),
            r => self.0 & r.bit() != 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Highest-precedence role, or Unknown.
    pub fn primary(&self) -> Role {
        self.iter().next().unwrap_or(Role::Unknown)
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        Role::KNOWN.into_iter().filter(|r| self.0 & r.bit() != 0)
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut set = RoleSet::empty();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

/// Everything known about a peer that announced itself with ENTER.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub display_name: String,
    pub roles: RoleSet,
    /// Bare IP taken from the transport address; empty when the address is malformed.
    pub ip_address: String,
    pub hostname: String,
    pub can_be_frozen: bool,
    /// Set when the peer advertises a video stream port.
    pub can_stream: bool,
    pub command_line: String,
    pub logger_port: Option<String>,
    pub streaming_port: Option<String>,
    pub service_headers: HashMap<String, String>,
}

impl PeerRecord {
    /// Build a record from ENTER data. Unrecognized headers are kept in `service_headers` only.
    pub fn from_enter(
        peer_id: PeerId,
        display_name: &str,
        transport_address: &str,
        headers: &HashMap<String, String>,
    ) -> Self {
        let mut record = PeerRecord {
            peer_id,
            display_name: display_name.to_string(),
            roles: RoleSet::empty(),
            ip_address: ip_from_address(transport_address),
            hostname: String::new(),
            can_be_frozen: false,
            can_stream: false,
            command_line: String::new(),
            logger_port: None,
            streaming_port: None,
            service_headers: headers.clone(),
        };
        for (key, value) in headers {
            if let Some(role) = Role::from_header_key(key) {
                if value == header::TRUE {
                    record.roles.insert(role);
                }
                continue;
            }
            match key.as_str() {
                header::HOSTNAME => record.hostname = value.clone(),
                header::CAN_BE_FROZEN => record.can_be_frozen = value == header::TRUE,
                header::COMMAND_LINE => record.command_line = value.clone(),
                header::LOGGER => record.logger_port = Some(value.clone()),
                header::VIDEO_STREAM => {
                    record.can_stream = !value.is_empty();
                    record.streaming_port = Some(value.clone());
                }
                _ => {}
            }
        }
        record
    }

    /// Primary role (see [`RoleSet::primary`]).
    pub fn role(&self) -> Role {
        self.roles.primary()
    }
}

/// Extract the bare IP from `scheme://ip:port`. Returns an empty string for anything else.
pub fn ip_from_address(address: &str) -> String {
    let Some((scheme, rest)) = address.split_once("://") else {
        return String::new();
    };
    if scheme.is_empty() {
        return String::new();
    }
    match rest.split_once(':') {
        Some((ip, port)) if !ip.is_empty() && !port.is_empty() && !port.contains(':') => {
            ip.to_string()
        }
        _ => String::new(),
    }
}
