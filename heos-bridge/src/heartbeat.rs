//! Keep-alive task for the controller connection.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use heos_connector::HeosConnector;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// When the controller last answered, shared between the heartbeat task and
/// the info page. Explicit state owned here, not a process-wide global.
pub type LastContact = Arc<RwLock<Option<DateTime<Utc>>>>;

/// Periodically verify the connection and reconnect once if it is gone.
///
/// The connector itself never retries; this task is the only place that
/// decides to call `connect()` again. One failed heartbeat triggers exactly
/// one reconnect attempt followed by one more heartbeat.
pub async fn run(connector: Arc<HeosConnector>, last_contact: LastContact, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // interval fires immediately; the first real check comes one period in
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let checker = Arc::clone(&connector);
        let connected = tokio::task::spawn_blocking(move || {
            if checker.is_connected() {
                return true;
            }
            checker.connect();
            checker.is_connected()
        })
        .await
        .unwrap_or(false);

        if connected {
            info!("heartbeat ok");
            *last_contact.write().await = Some(Utc::now());
        } else {
            warn!("HEOS system did not respond to heartbeat");
        }
    }
}
