//! Wire-level pieces of the HEOS CLI protocol.
//!
//! Commands are one line of text, `heos://group/verb?arg=value&...`,
//! terminated by a newline. Replies are one JSON object per line containing
//! at least a `command` field naming the command they answer. Success and
//! session-state checks are deliberately loose substring matches: the device
//! does not guarantee stable key ordering or whitespace, so the reply is
//! never parsed structurally just to decide success (only the catalog
//! listings get structural parsing, in [`catalog`](crate::catalog)).

use crate::error::ConnectorError;

/// Every command line starts with this scheme
pub const PREFIX: &str = "heos://";

/// Default CLI port on a HEOS controller
pub const DEFAULT_PORT: u16 = 1255;

/// Source id of the favorites listing
pub const FAVORITES_SID: &str = "1028";

/// Source id of the playlists listing
pub const PLAYLISTS_SID: &str = "1025";

/// Type discriminator for station entries in a favorites payload
pub const TYPE_STATION: &str = "station";

/// Type discriminator for playlist containers in a browse payload
pub const TYPE_PLAYLIST: &str = "playlist";

/// Token present in every successful reply
pub const RESULT_SUCCESS: &str = "\"result\": \"success\"";

/// Token present in a play-state reply for an actively playing player
pub const STATE_PLAY: &str = "state=play";

/// Marker for the interim "accepted but still executing" acknowledgment
pub const UNDER_PROCESS: &str = "\"message\": \"command under process";

/// An immutable command: name plus raw argument string.
///
/// The argument string is sent verbatim after the command name (typically
/// `?key=value&...`) and may be empty. Constructed fresh per invocation and
/// discarded once the exchange completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    arguments: String,
}

impl Command {
    /// Build a command, rejecting an empty name before any socket I/O.
    pub fn new(name: &str, arguments: &str) -> Result<Self, ConnectorError> {
        if name.is_empty() {
            return Err(ConnectorError::InvalidCommand(
                "command name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name: name.to_string(),
            arguments: arguments.to_string(),
        })
    }

    /// The command name, e.g. `player/get_players`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The exact line put on the wire (without the trailing newline):
    /// `heos://<name><arguments>`
    pub fn wire_form(&self) -> String {
        format!("{PREFIX}{}{}", self.name, self.arguments)
    }
}

/// How a received line relates to the command currently awaiting a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// The line answers a different command; the channel is no longer
    /// trustworthy for this exchange
    Mismatch,
    /// The device accepted the command but is still executing it
    Pending,
    /// The final reply for this command
    Final,
}

/// Classify a reply line against the command it should answer.
pub fn classify(line: &str, command: &str) -> ResponseClass {
    if !line.contains(&format!("\"command\": \"{command}\"")) {
        ResponseClass::Mismatch
    } else if line.contains(UNDER_PROCESS) {
        ResponseClass::Pending
    } else {
        ResponseClass::Final
    }
}

/// Loose success check: does the reply contain the expected token?
///
/// The token is command-specific (generic success marker, a play-state
/// token, a signed-in marker annotated with the username, a player id in a
/// groups payload). Substring containment is intentional; see the module
/// docs.
pub fn indicates(response: &str, token: &str) -> bool {
    !token.is_empty() && response.contains(token)
}
