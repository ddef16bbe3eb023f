//! Command correlator: send a command to one peer, match the later status reply by command name.
//!
//! There is no request ticket on the wire. At most one command of a given correlated name may be
//! outstanding; a second send is dropped until the reply arrives or the caller abandons the first.
//! No timeouts: a command whose reply never comes stays pending until abandoned.

use std::collections::{BTreeSet, HashMap};

use crate::peer::PeerId;
use crate::protocol::{command_name, CommandStatus};
use crate::transport::OutboundAction;

/// A command waiting for its status reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatedCommand {
    pub target: PeerId,
    pub command_text: String,
    /// Command name the reply must carry (`<name>=<params> STATUS=<digit>`).
    pub reply_pattern: String,
}

/// A status reply matched to a correlated command name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub name: String,
    pub from: PeerId,
    pub success: bool,
    pub params: String,
    /// The command this reply released, if one was pending.
    pub command: Option<CorrelatedCommand>,
}

/// Why a command was not sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("empty target peer id")]
    EmptyTarget,
    #[error("empty command text")]
    EmptyCommand,
    #[error("command {name} already pending on peer {target}")]
    AlreadyPending { name: String, target: PeerId },
}

#[derive(Debug, Default)]
pub struct CommandCorrelator {
    correlated: BTreeSet<String>,
    pending: HashMap<String, CorrelatedCommand>,
}

impl CommandCorrelator {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            correlated: names.into_iter().map(Into::into).collect(),
            pending: HashMap::new(),
        }
    }

    pub fn is_correlated(&self, name: &str) -> bool {
        self.correlated.contains(name)
    }

    pub fn pending(&self, name: &str) -> Option<&CorrelatedCommand> {
        self.pending.get(name)
    }

    /// Build the send for `command_text` to `target`, or say why it was dropped.
    pub fn try_send(
        &mut self,
        target: &PeerId,
        command_text: &str,
    ) -> Result<OutboundAction, SendError> {
        if target.is_empty() {
            return Err(SendError::EmptyTarget);
        }
        if command_text.is_empty() {
            return Err(SendError::EmptyCommand);
        }
        let name = command_name(command_text);
        if self.is_correlated(name) {
            if let Some(p) = self.pending.get(name) {
                return Err(SendError::AlreadyPending {
                    name: name.to_string(),
                    target: p.target.clone(),
                });
            }
            self.pending.insert(
                name.to_string(),
                CorrelatedCommand {
                    target: target.clone(),
                    command_text: command_text.to_string(),
                    reply_pattern: name.to_string(),
                },
            );
        }
        Ok(OutboundAction::SendTo {
            peer_id: target.clone(),
            text: command_text.to_string(),
        })
    }

    /// Best-effort send: a dropped command is logged, never returned as an error.
    pub fn send_command(&mut self, target: &PeerId, command_text: &str) -> Option<OutboundAction> {
        match self.try_send(target, command_text) {
            Ok(action) => {
                tracing::info!(peer = %target, command = command_text, "command sent");
                Some(action)
            }
            Err(e) => {
                tracing::warn!(peer = %target, command = command_text, error = %e, "command dropped");
                None
            }
        }
    }

    /// Status reply from `from`. None when the command name is not correlated.
    pub fn on_reply(&mut self, from: &PeerId, status: CommandStatus) -> Option<CommandReply> {
        if !self.is_correlated(&status.name) {
            return None;
        }
        let command = self.pending.remove(&status.name);
        if command.is_none() {
            tracing::debug!(peer = %from, name = %status.name, "status reply with no pending command");
        }
        Some(CommandReply {
            name: status.name,
            from: from.clone(),
            success: status.success,
            params: status.params,
            command,
        })
    }

    /// Stop waiting for the reply to `name`. A late reply is still surfaced, with no command attached.
    pub fn abandon(&mut self, name: &str) -> Option<CorrelatedCommand> {
        self.pending.remove(name)
    }

    /// Release every command pending on `peer_id` (the peer left; its reply will not come).
    pub fn abandon_for_peer(&mut self, peer_id: &PeerId) -> Vec<CorrelatedCommand> {
        let names: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, c)| &c.target == peer_id)
            .map(|(name, _)| name.clone())
            .collect();
        names
            .iter()
            .filter_map(|name| self.pending.remove(name))
            .collect()
    }
}
