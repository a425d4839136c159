//! Connector configuration.

use std::time::Duration;

use crate::protocol::DEFAULT_PORT;

/// Total wall-clock budget for one command exchange
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// How long to wait for data before re-checking the deadline
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything a [`HeosConnector`](crate::HeosConnector) needs to reach and
/// sign in to a controller. The connector owns no configuration loading;
/// these values are passed in at construction by the surrounding system.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Hostname or IP address of the HEOS controller
    pub host: String,
    /// CLI port, normally 1255
    pub port: u16,
    /// HEOS account username, used for sign-in and the signed-in check
    pub username: String,
    /// HEOS account password
    pub password: String,
    /// Total wall-clock budget for one command exchange
    pub timeout: Duration,
    /// Poll interval while waiting for a reply line
    pub poll_interval: Duration,
}

impl ConnectorConfig {
    /// Configuration with the standard port and timing defaults.
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: password.into(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
