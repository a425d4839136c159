//! The HTTP command surface.
//!
//! One GET endpoint: `?player=<pid>&command=<name>` plus command-specific
//! parameters, answered with a plain `SUCCESS`/`FAILED` body. Calling with
//! no parameters at all renders an info page listing settings, players,
//! stations and playlists. The response contract is deliberately simple so
//! home-automation scenes can fire commands with a bare HTTP GET.

use std::collections::HashMap;
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use heos_connector::{entries_sorted_by_values, HeosConnector};
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::Filter;

use crate::config::Settings;
use crate::fibaro::{FibaroClient, LABEL_ID, SLIDER_ID};
use crate::heartbeat::LastContact;

pub const PARAM_PLAYER: &str = "player";
pub const PARAM_COMMAND: &str = "command";
pub const PARAM_STATION: &str = "station";
pub const PARAM_PLAYLIST: &str = "playlist";
pub const PARAM_VOLUME: &str = "volume";
pub const PARAM_INPUT_PLAYER: &str = "inputplayer";
pub const PARAM_INPUT_NAME: &str = "inputname";
pub const PARAM_VIRTUAL_DEVICE: &str = "vd";
pub const PARAM_LABEL_TEXT: &str = "labeltext";

/// Everything a request handler needs, shared across requests.
#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<HeosConnector>,
    pub fibaro: Arc<FibaroClient>,
    pub last_contact: LastContact,
    pub settings: Settings,
}

/// The commands the bridge accepts, case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BridgeCommand {
    Play,
    Stop,
    Volume,
    Station,
    Playlist,
    Input,
    /// Set volume, then play a station
    Alarm,
    /// Like alarm, but a no-op when the player is already playing
    Trigger,
}

impl FromStr for BridgeCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "play" => Ok(Self::Play),
            "stop" => Ok(Self::Stop),
            "volume" => Ok(Self::Volume),
            "station" => Ok(Self::Station),
            "playlist" => Ok(Self::Playlist),
            "input" => Ok(Self::Input),
            "alarm" => Ok(Self::Alarm),
            "trigger" => Ok(Self::Trigger),
            _ => Err(()),
        }
    }
}

/// Build the GET route handling both commands and the info page.
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let state_filter = warp::any().map(move || state.clone());
    warp::get()
        .and(warp::path::end())
        .and(warp::query::<HashMap<String, String>>())
        .and(state_filter)
        .and_then(handle_request)
}

async fn handle_request(
    params: HashMap<String, String>,
    state: AppState,
) -> Result<impl warp::Reply, Infallible> {
    // The connector is blocking I/O; keep it off the async workers.
    let outcome = tokio::task::spawn_blocking(move || {
        if params.is_empty() {
            (StatusCode::OK, info_page(&state))
        } else {
            dispatch(&state, &params)
        }
    })
    .await
    .unwrap_or_else(|err| {
        warn!(error = %err, "request worker panicked");
        (StatusCode::INTERNAL_SERVER_ERROR, "FAILED".to_string())
    });

    Ok(warp::reply::with_status(warp::reply::html(outcome.1), outcome.0))
}

fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> &'a str {
    params.get(key).map(String::as_str).unwrap_or("")
}

fn failed(status: StatusCode) -> (StatusCode, String) {
    (status, "FAILED".to_string())
}

/// Validate and execute one command request: parameter checks first, then
/// catalog membership, then connectivity (with a single reconnect attempt),
/// then the command itself.
fn dispatch(state: &AppState, params: &HashMap<String, String>) -> (StatusCode, String) {
    let connector = &state.connector;
    let player = param(params, PARAM_PLAYER);
    let command = param(params, PARAM_COMMAND);

    if player.is_empty() || command.is_empty() {
        warn!("invalid request, missing parameters for player and command");
        return failed(StatusCode::BAD_REQUEST);
    }
    if !connector.get_players().contains_key(player) {
        warn!(player, "invalid request, invalid player");
        return failed(StatusCode::BAD_REQUEST);
    }
    let Ok(bridge_command) = BridgeCommand::from_str(command) else {
        warn!(command, "invalid request, invalid command");
        return failed(StatusCode::BAD_REQUEST);
    };

    if !connector.is_connected() {
        connector.connect();
        if !connector.is_connected() {
            warn!("not connected to the HEOS system");
            return failed(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    let virtual_device = param(params, PARAM_VIRTUAL_DEVICE);
    let label_text = param(params, PARAM_LABEL_TEXT);

    let result = match bridge_command {
        BridgeCommand::Play => {
            let success = connector.play(player);
            if success && !virtual_device.is_empty() {
                let now_playing = connector.get_now_playing(player);
                state.fibaro.set_text_label(virtual_device, LABEL_ID, &now_playing);
            }
            success
        }

        BridgeCommand::Stop => {
            let success = connector.stop(player);
            if success && !virtual_device.is_empty() {
                state.fibaro.set_text_label(virtual_device, LABEL_ID, "");
            }
            success
        }

        BridgeCommand::Volume => {
            let Some(volume) = parse_volume(param(params, PARAM_VOLUME)) else {
                warn!("invalid request, invalid volume");
                return failed(StatusCode::BAD_REQUEST);
            };
            connector.volume(player, volume)
        }

        BridgeCommand::Station => {
            let station = param(params, PARAM_STATION);
            if !connector.get_stations().contains_key(station) {
                warn!(station, "invalid request, invalid station");
                return failed(StatusCode::BAD_REQUEST);
            }
            let success = connector.station(player, station);
            if success && !virtual_device.is_empty() && !label_text.is_empty() {
                state.fibaro.set_text_label(virtual_device, LABEL_ID, label_text);
            }
            success
        }

        BridgeCommand::Playlist => {
            let playlist = param(params, PARAM_PLAYLIST);
            let playlists = connector.get_playlists();
            let Some(playlist_name) = playlists.get(playlist) else {
                warn!(playlist, "invalid request, invalid playlist");
                return failed(StatusCode::BAD_REQUEST);
            };
            let success = connector.playlist(player, playlist);
            if success && !virtual_device.is_empty() {
                state.fibaro.set_text_label(virtual_device, LABEL_ID, playlist_name);
            }
            success
        }

        BridgeCommand::Input => {
            let input_player = param(params, PARAM_INPUT_PLAYER);
            let input_name = param(params, PARAM_INPUT_NAME);
            if !connector.get_players().contains_key(input_player) {
                warn!(input_player, "invalid request, invalid input player");
                return failed(StatusCode::BAD_REQUEST);
            }
            let success = connector.input(player, input_player, input_name);
            if success && !virtual_device.is_empty() && !label_text.is_empty() {
                state.fibaro.set_text_label(virtual_device, LABEL_ID, label_text);
            }
            success
        }

        BridgeCommand::Alarm | BridgeCommand::Trigger => {
            if bridge_command == BridgeCommand::Trigger && connector.is_playing(player) {
                touch_last_contact(state);
                return (StatusCode::OK, "SUCCESS".to_string());
            }
            let station = param(params, PARAM_STATION);
            if !connector.get_stations().contains_key(station) {
                warn!(station, "invalid request, invalid station");
                return failed(StatusCode::BAD_REQUEST);
            }
            let Some(volume) = parse_volume(param(params, PARAM_VOLUME)) else {
                warn!("invalid request, invalid volume");
                return failed(StatusCode::BAD_REQUEST);
            };
            let success = connector.volume(player, volume) && connector.station(player, station);
            if success {
                if !virtual_device.is_empty() && !label_text.is_empty() {
                    state.fibaro.set_text_label(virtual_device, LABEL_ID, label_text);
                }
                // Moving the slider echoes back as another volume call
                if !virtual_device.is_empty() {
                    state.fibaro.set_volume_slider(virtual_device, SLIDER_ID, volume);
                }
            }
            success
        }
    };

    info!(
        command,
        player = %connector.get_players().get(player).cloned().unwrap_or_default(),
        result = if result { "SUCCESS" } else { "FAILED" },
        "command processed"
    );
    if result {
        touch_last_contact(state);
    }
    (StatusCode::OK, if result { "SUCCESS" } else { "FAILED" }.to_string())
}

fn parse_volume(value: &str) -> Option<u8> {
    let volume: i32 = value.parse().ok()?;
    if (0..=100).contains(&volume) {
        Some(volume as u8)
    } else {
        None
    }
}

fn touch_last_contact(state: &AppState) {
    *state.last_contact.blocking_write() = Some(Utc::now());
}

/// Render the info page: settings, connection state, and the sorted
/// catalogs, refreshed from the device.
fn info_page(state: &AppState) -> String {
    let connector = &state.connector;
    let settings = &state.settings;

    let connected = connector.is_connected();
    if connected {
        touch_last_contact(state);
    }
    let signed_in = connector.is_user_signed_in(&settings.heos_user);
    let last_contact = (*state.last_contact.blocking_read())
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut page = String::new();
    page.push_str("<html><head><title>HEOS Bridge</title></head><body>\n");
    page.push_str("<h1>HEOS Bridge</h1>\n");
    page.push_str(&format!(
        "<div>Version: {}</div>\n",
        env!("CARGO_PKG_VERSION")
    ));

    page.push_str("<h2>Settings</h2>\n");
    page.push_str(&format!(
        "<div>HEOS host: {} ({})</div>\n",
        settings.heos_host,
        if connected { "connected" } else { "disconnected" }
    ));
    page.push_str(&format!(
        "<div>HEOS user: {} ({})</div>\n",
        settings.heos_user,
        if signed_in { "signed in" } else { "signed out" }
    ));
    page.push_str(&format!("<div>Last contact: {last_contact}</div>\n"));
    page.push_str(&format!("<div>Fibaro host: {}</div>\n", settings.fibaro_host));

    page.push_str("<h2>HEOS players</h2>\n");
    connector.update_players();
    for (pid, name) in entries_sorted_by_values(&connector.get_players()) {
        let now_playing = connector.get_now_playing(&pid);
        page.push_str(&format!("<div>{pid} &mdash; {name} {now_playing}</div>\n"));
    }

    page.push_str("<h2>Favorite stations</h2>\n");
    connector.update_stations();
    for (mid, name) in entries_sorted_by_values(&connector.get_stations()) {
        page.push_str(&format!("<div>{mid} &mdash; {name}</div>\n"));
    }

    page.push_str("<h2>Playlists</h2>\n");
    connector.update_playlists();
    for (cid, name) in entries_sorted_by_values(&connector.get_playlists()) {
        page.push_str(&format!("<div>{cid} &mdash; {name}</div>\n"));
    }

    page.push_str("<h2>API</h2>\n");
    page.push_str("<div>?player=12345&amp;command=play&amp;vd=123</div>\n");
    page.push_str("<div>?player=12345&amp;command=stop&amp;vd=123</div>\n");
    page.push_str("<div>?player=12345&amp;command=volume&amp;volume=50&amp;vd=123</div>\n");
    page.push_str(
        "<div>?player=12345&amp;command=station&amp;station=s12345&amp;vd=123&amp;labeltext=Example</div>\n",
    );
    page.push_str(
        "<div>?player=12345&amp;command=playlist&amp;playlist=12345&amp;vd=123</div>\n",
    );
    page.push_str(
        "<div>?player=12345&amp;command=input&amp;inputplayer=23456&amp;inputname=inputs/aux_in_1</div>\n",
    );
    page.push_str(
        "<div>?player=12345&amp;command=alarm&amp;station=s12345&amp;volume=50&amp;vd=123</div>\n",
    );
    page.push_str(
        "<div>?player=12345&amp;command=trigger&amp;station=s12345&amp;volume=50&amp;vd=123</div>\n",
    );
    page.push_str(
        "<div>Alarm always changes station and volume; trigger skips both when the player is already playing</div>\n",
    );
    page.push_str("</body></html>\n");
    page
}
