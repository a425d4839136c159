//! Integration tests driving [`HeosConnector`] against a scripted
//! in-process device double speaking the line-oriented CLI protocol.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use heos_connector::{ConnectorConfig, HeosConnector};

/// A fake HEOS controller: accepts one connection, logs every received
/// command line, and answers each through the provided responder.
struct MockHeos {
    port: u16,
    received: Arc<Mutex<Vec<String>>>,
}

impl MockHeos {
    /// Spawn the device. The responder maps one received command line to
    /// zero or more reply lines, written back immediately.
    fn spawn<F>(mut responder: F) -> Self
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock device");
        let port = listener.local_addr().expect("local addr").port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);

        thread::spawn(move || {
            let (stream, _) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            let mut writer = stream.try_clone().expect("clone stream");
            let mut reader = BufReader::new(stream);
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                let line = line.trim_end().to_string();
                log.lock().unwrap().push(line.clone());
                for reply in responder(&line) {
                    if write_line(&mut writer, &reply).is_err() {
                        return;
                    }
                }
            }
        });

        Self { port, received }
    }

    fn connector(&self) -> HeosConnector {
        let mut config = ConnectorConfig::new("127.0.0.1", "user@example.com", "secret");
        config.port = self.port;
        config.timeout = Duration::from_millis(500);
        config.poll_interval = Duration::from_millis(25);
        HeosConnector::new(config)
    }

    fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

fn write_line(writer: &mut TcpStream, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Command name from a wire line `heos://name?args`.
fn command_name(line: &str) -> &str {
    let rest = line.strip_prefix("heos://").unwrap_or(line);
    rest.split('?').next().unwrap_or(rest)
}

fn success(command: &str) -> String {
    format!(r#"{{"heos": {{"command": "{command}", "result": "success", "message": ""}}}}"#)
}

fn pending(command: &str) -> String {
    format!(
        r#"{{"heos": {{"command": "{command}", "result": "success", "message": "command under process"}}}}"#
    )
}

fn signed_in(command: &str, username: &str) -> String {
    format!(
        r#"{{"heos": {{"command": "{command}", "result": "success", "message": "signed_in&un={username}"}}}}"#
    )
}

fn signed_out(command: &str) -> String {
    format!(r#"{{"heos": {{"command": "{command}", "result": "success", "message": "signed_out"}}}}"#)
}

fn groups_with_player(pid: &str) -> String {
    format!(
        r#"{{"heos": {{"command": "group/get_groups", "result": "success"}}, "payload": [{{"name": "Kitchen + Den", "gid": "1", "players": [{{"name": "Kitchen", "pid": {pid}, "role": "leader"}}]}}]}}"#
    )
}

fn no_groups() -> String {
    r#"{"heos": {"command": "group/get_groups", "result": "success"}, "payload": []}"#.to_string()
}

/// A responder that answers every session-state query as "idle": no groups,
/// signed in, and success for everything else.
fn idle_responder(username: &'static str) -> impl FnMut(&str) -> Vec<String> + Send + 'static {
    move |line: &str| {
        let name = command_name(line).to_string();
        match name.as_str() {
            "group/get_groups" => vec![no_groups()],
            "system/check_account" => vec![signed_in(&name, username)],
            _ => vec![success(&name)],
        }
    }
}

#[test]
fn wire_form_reaches_the_device_byte_for_byte() {
    let device = MockHeos::spawn(idle_responder("user@example.com"));
    let connector = device.connector();

    assert!(connector.volume("12345", 30));
    assert_eq!(
        device.received(),
        vec!["heos://player/set_volume?pid=12345&level=30".to_string()]
    );
}

#[test]
fn heartbeat_success_means_connected() {
    let device = MockHeos::spawn(idle_responder("user@example.com"));
    let connector = device.connector();

    assert!(connector.is_connected());
    assert_eq!(device.received(), vec!["heos://system/heart_beat".to_string()]);
}

#[test]
fn mismatched_reply_aborts_the_exchange() {
    let device = MockHeos::spawn(|_line| {
        vec![r#"{"heos": {"command": "player/get_players", "result": "success"}}"#.to_string()]
    });
    let connector = device.connector();

    let started = Instant::now();
    assert!(!connector.volume("12345", 30));
    // Aborted on the first (wrong) line, well before the timeout
    assert!(started.elapsed() < connector.timeout());
}

#[test]
fn pending_replies_are_discarded_until_the_final_one() {
    let device = MockHeos::spawn(|line| {
        let name = command_name(line).to_string();
        match name.as_str() {
            "browse/play_input" => vec![pending(&name), pending(&name), success(&name)],
            "group/get_groups" => vec![no_groups()],
            _ => vec![success(&name)],
        }
    });
    let connector = device.connector();

    assert!(connector.input("12345", "23456", "inputs/aux_in_1"));

    // All three reply lines were consumed by that exchange: a follow-up
    // command still correlates cleanly.
    assert!(connector.is_connected());
    let received = device.received();
    assert_eq!(received.len(), 3);
    assert_eq!(received[2], "heos://system/heart_beat");
}

#[test]
fn silent_device_times_out_within_bounds() {
    let device = MockHeos::spawn(|_line| Vec::new());
    let connector = device.connector();
    let timeout = connector.timeout();
    let poll = connector.poll_interval();

    let started = Instant::now();
    assert!(!connector.is_connected());
    let elapsed = started.elapsed();

    assert!(elapsed >= timeout, "gave up after {elapsed:?}, before the {timeout:?} timeout");
    // One poll interval of slack, plus a little scheduling headroom
    assert!(
        elapsed < timeout + poll + Duration::from_millis(100),
        "gave up only after {elapsed:?}"
    );
}

#[test]
fn play_on_grouped_player_ungroups_first() {
    let device = MockHeos::spawn(|line| {
        let name = command_name(line).to_string();
        match name.as_str() {
            "group/get_groups" => vec![groups_with_player("12345")],
            _ => vec![success(&name)],
        }
    });
    let connector = device.connector();

    assert!(connector.play("12345"));
    let received = device.received();
    assert_eq!(
        received,
        vec![
            "heos://group/get_groups".to_string(),
            "heos://group/set_group?pid=12345".to_string(),
            "heos://player/set_play_state?pid=12345&state=play".to_string(),
        ]
    );
}

#[test]
fn stop_on_ungrouped_player_skips_the_ungroup() {
    let device = MockHeos::spawn(idle_responder("user@example.com"));
    let connector = device.connector();

    assert!(connector.stop("12345"));
    assert_eq!(
        device.received(),
        vec![
            "heos://group/get_groups".to_string(),
            "heos://player/set_play_state?pid=12345&state=stop".to_string(),
        ]
    );
}

#[test]
fn station_signs_in_first_when_signed_out() {
    let device = MockHeos::spawn(|line| {
        let name = command_name(line).to_string();
        match name.as_str() {
            "group/get_groups" => vec![no_groups()],
            "system/check_account" => vec![signed_out(&name)],
            _ => vec![success(&name)],
        }
    });
    let connector = device.connector();

    assert!(connector.station("12345", "s6789"));
    let received = device.received();
    assert_eq!(
        received,
        vec![
            "heos://group/get_groups".to_string(),
            "heos://system/check_account".to_string(),
            "heos://system/sign_in?un=user@example.com&pw=secret".to_string(),
            "heos://browse/play_stream?pid=12345&sid=1028&mid=s6789".to_string(),
        ]
    );
}

#[test]
fn playlist_skips_sign_in_when_already_signed_in() {
    let device = MockHeos::spawn(idle_responder("user@example.com"));
    let connector = device.connector();

    assert!(connector.playlist("12345", "171"));
    let received = device.received();
    assert!(!received.iter().any(|line| line.contains("system/sign_in")));
    assert_eq!(
        received.last().map(String::as_str),
        Some("heos://browse/add_to_queue?pid=12345&sid=1025&cid=171&aid=4")
    );
}

#[test]
fn station_catalog_rebuild_keeps_stations_only() {
    let device = MockHeos::spawn(|line| {
        let name = command_name(line).to_string();
        match name.as_str() {
            "system/check_account" => vec![signed_in(&name, "user@example.com")],
            "browse/browse" => vec![concat!(
                r#"{"heos": {"command": "browse/browse", "result": "success"}, "payload": ["#,
                r#"{"name": "P3", "type": "station", "mid": "s1001"}, "#,
                r#"{"name": "An Album", "type": "album", "mid": "a2002"}, "#,
                r#"{"name": "Lugna Favoriter", "type": "station", "mid": "s3003"}]}"#
            )
            .to_string()],
            _ => vec![success(&name)],
        }
    });
    let connector = device.connector();

    connector.update_stations();
    let stations = connector.get_stations();
    assert_eq!(stations.len(), 2);
    assert_eq!(stations.get("s1001"), Some(&"P3".to_string()));
    assert_eq!(stations.get("s3003"), Some(&"Lugna Favoriter".to_string()));
}

#[test]
fn player_catalog_rebuild_replaces_the_previous_map() {
    let device = MockHeos::spawn(|line| {
        let name = command_name(line).to_string();
        match name.as_str() {
            "player/get_players" => vec![
                r#"{"heos": {"command": "player/get_players", "result": "success"}, "payload": [{"name": "Kitchen", "pid": 12345}]}"#
                    .to_string(),
            ],
            _ => vec![success(&name)],
        }
    });
    let connector = device.connector();

    assert!(connector.get_players().is_empty());
    connector.update_players();
    let players = connector.get_players();
    assert_eq!(players.len(), 1);
    assert_eq!(players.get("12345"), Some(&"Kitchen".to_string()));
}

#[test]
fn now_playing_reads_station_from_the_payload() {
    let device = MockHeos::spawn(|line| {
        let name = command_name(line).to_string();
        match name.as_str() {
            "player/get_now_playing_media" => vec![
                r#"{"heos": {"command": "player/get_now_playing_media", "result": "success"}, "payload": {"type": "station", "song": "Morning Show", "station": "P3"}}"#
                    .to_string(),
            ],
            _ => vec![success(&name)],
        }
    });
    let connector = device.connector();

    assert_eq!(connector.get_now_playing("12345"), "P3");
}

#[test]
fn concurrent_commands_never_interleave_on_the_wire() {
    // Delay every reply so an unserialized second command would hit the
    // socket mid-exchange and be answered by the wrong reply.
    let device = MockHeos::spawn(|line| {
        thread::sleep(Duration::from_millis(50));
        vec![success(command_name(line))]
    });
    let connector = Arc::new(device.connector());

    let mut handles = Vec::new();
    for level in [10u8, 20, 30, 40] {
        let connector = Arc::clone(&connector);
        handles.push(thread::spawn(move || connector.volume("12345", level)));
    }
    for handle in handles {
        assert!(handle.join().expect("worker panicked"));
    }

    let received = device.received();
    assert_eq!(received.len(), 4);
    for line in &received {
        assert!(line.starts_with("heos://player/set_volume?pid=12345&level="));
    }
}
