//! Protocol connector for the Denon HEOS CLI.
//!
//! HEOS controllers expose a line-oriented control protocol on TCP port 1255:
//! each command is one `heos://`-prefixed line, each reply is one JSON object
//! on its own line. Replies arrive asynchronously, may report the command as
//! still "under process", and carry implicit session state (signed-in,
//! grouped) that can change out-of-band at any time.
//!
//! [`HeosConnector`] owns the socket, serializes all command exchanges, and
//! layers the multi-step operations (ungroup-then-play, sign-in-then-stream)
//! the device requires on top of the raw protocol. Every public operation
//! degrades to `false`, an empty string, or an empty map on failure; callers
//! treat the results as advisory and never see an error type.

mod catalog;
mod config;
mod connector;
mod error;
mod protocol;

pub use catalog::{entries_sorted_by_values, Catalog};
pub use config::ConnectorConfig;
pub use connector::HeosConnector;
pub use error::{ConnectorError, Result};
pub use protocol::{classify, indicates, Command, ResponseClass};
