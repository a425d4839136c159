//! HEOS bridge: an HTTP GET surface in front of the HEOS protocol
//! connector, plus the Fibaro notification sink and the connection
//! keep-alive task.

mod config;
mod fibaro;
mod heartbeat;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use heos_connector::{ConnectorConfig, HeosConnector};
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Settings;
use fibaro::FibaroClient;
use routes::AppState;

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::parse();
    let listen_port = settings.listen_port;

    let connector_config = ConnectorConfig::new(
        settings.heos_host.clone(),
        settings.heos_user.clone(),
        settings.heos_password.clone(),
    );
    let connector = tokio::task::spawn_blocking(move || {
        let connector = HeosConnector::new(connector_config);
        // State is rebuilt from the device, never persisted
        connector.update_players();
        connector.update_stations();
        connector.update_playlists();
        connector
    })
    .await
    .expect("connector startup task panicked");
    let connector = Arc::new(connector);

    let fibaro = Arc::new(FibaroClient::new(
        settings.fibaro_host.clone(),
        &settings.fibaro_user,
        &settings.fibaro_password,
    ));

    let last_contact = Arc::new(RwLock::new(None));
    tokio::spawn(heartbeat::run(
        Arc::clone(&connector),
        Arc::clone(&last_contact),
        HEARTBEAT_PERIOD,
    ));

    let state = AppState {
        connector,
        fibaro,
        last_contact,
        settings,
    };

    info!(port = listen_port, "HEOS bridge listening");
    warp::serve(routes::routes(state))
        .run(([0, 0, 0, 0], listen_port))
        .await;
}
