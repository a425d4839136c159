//! Catalog payload parsing and sorting.
//!
//! The catalog listings (players, favorite stations, playlists) are the only
//! replies parsed as structured JSON. Each rebuild replaces the previous map
//! wholesale; a malformed payload yields an empty map, and a malformed
//! element within an otherwise valid payload is skipped rather than failing
//! the rebuild.

use std::collections::HashMap;

use serde_json::Value;
use tracing::error;

/// Identifier → display name, rebuilt wholesale on demand
pub type Catalog = HashMap<String, String>;

/// Parse a `player/get_players` reply into pid → name.
pub fn parse_players(raw: &str) -> Catalog {
    let mut players = Catalog::new();
    for element in payload_elements(raw, "players") {
        let Some(pid) = element.get("pid").and_then(id_string) else {
            continue;
        };
        let Some(name) = element.get("name").and_then(Value::as_str) else {
            continue;
        };
        players.insert(pid, name.to_string());
    }
    players
}

/// Parse a favorites browse reply into mid → name, keeping station entries
/// only. The favorites listing mixes stations with other entry types.
pub fn parse_stations(raw: &str) -> Catalog {
    let mut stations = Catalog::new();
    for element in payload_elements(raw, "stations") {
        if element.get("type").and_then(Value::as_str) != Some(crate::protocol::TYPE_STATION) {
            continue;
        }
        let Some(mid) = element.get("mid").and_then(id_string) else {
            continue;
        };
        let Some(name) = element.get("name").and_then(Value::as_str) else {
            continue;
        };
        stations.insert(mid, name.to_string());
    }
    stations
}

/// Parse a playlists browse reply into cid → name, keeping playlist
/// containers only.
pub fn parse_playlists(raw: &str) -> Catalog {
    let mut playlists = Catalog::new();
    for element in payload_elements(raw, "playlists") {
        if element.get("type").and_then(Value::as_str) != Some(crate::protocol::TYPE_PLAYLIST) {
            continue;
        }
        let Some(cid) = element.get("cid").and_then(id_string) else {
            continue;
        };
        let Some(name) = element.get("name").and_then(Value::as_str) else {
            continue;
        };
        playlists.insert(cid, name.to_string());
    }
    playlists
}

/// Extract the now-playing description from a `get_now_playing_media` reply:
/// the station if one is set, otherwise the song, otherwise empty.
pub fn parse_now_playing(raw: &str) -> String {
    let root: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            error!(error = %err, "could not parse now-playing payload");
            return String::new();
        }
    };
    let Some(payload) = root.get("payload") else {
        return String::new();
    };
    for field in ["station", "song"] {
        if let Some(text) = payload.get(field).and_then(Value::as_str) {
            if !text.is_empty() {
                return text.to_string();
            }
        }
    }
    String::new()
}

/// Order catalog entries by name ascending.
///
/// Entries with equal names are all retained; ties break on the identifier
/// so the order is deterministic.
pub fn entries_sorted_by_values(catalog: &Catalog) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = catalog
        .iter()
        .map(|(id, name)| (id.clone(), name.clone()))
        .collect();
    entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    entries
}

/// The payload array of a reply, or empty when the reply is not valid JSON
/// or carries no array payload.
fn payload_elements(raw: &str, what: &str) -> Vec<Value> {
    let root: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            error!(error = %err, "could not parse result when getting {what}");
            return Vec::new();
        }
    };
    match root.get("payload").and_then(Value::as_array) {
        Some(elements) => elements.clone(),
        None => {
            error!("no payload array in reply when getting {what}");
            Vec::new()
        }
    }
}

/// Identifiers arrive as JSON numbers (pid) or strings (mid, cid); both
/// normalize to their string form.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
