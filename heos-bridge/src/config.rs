//! Bridge settings, taken from the command line or environment.

use clap::Parser;

/// Settings for the HEOS bridge.
///
/// Every flag can also come from the environment, so the bridge runs
/// unattended under a service manager with a plain env file.
#[derive(Debug, Clone, Parser)]
#[command(name = "heos-bridge", version, about = "HTTP bridge for HEOS audio control")]
pub struct Settings {
    /// Hostname or IP address of the HEOS controller
    #[arg(long, env = "HEOS_HOST")]
    pub heos_host: String,

    /// HEOS account username
    #[arg(long, env = "HEOS_USER")]
    pub heos_user: String,

    /// HEOS account password
    #[arg(long, env = "HEOS_PASSWORD")]
    pub heos_password: String,

    /// Hostname or IP address of the Fibaro home center
    #[arg(long, env = "FIBARO_HOST")]
    pub fibaro_host: String,

    /// Fibaro username
    #[arg(long, env = "FIBARO_USER")]
    pub fibaro_user: String,

    /// Fibaro password
    #[arg(long, env = "FIBARO_PASSWORD")]
    pub fibaro_password: String,

    /// Port the HTTP surface listens on
    #[arg(long, env = "LISTEN_PORT", default_value_t = 8080)]
    pub listen_port: u16,
}
