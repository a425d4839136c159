//! The connector: socket lifecycle, serialized command exchanges, and the
//! derived operations built on top of them.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use socket2::SockRef;
use tracing::{debug, error, info, warn};

use crate::catalog::{self, Catalog};
use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, Result};
use crate::protocol::{
    classify, indicates, Command, ResponseClass, FAVORITES_SID, PLAYLISTS_SID, RESULT_SUCCESS,
    STATE_PLAY,
};

/// One live connection to the controller: the write half plus a buffered
/// reader over a clone of the same stream. A line interrupted by a poll
/// timeout accumulates in `partial` until its newline arrives.
struct Link {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    partial: String,
}

impl Link {
    fn open(config: &ConnectorConfig) -> Result<Self> {
        let address = format!("{}:{}", config.host, config.port);
        let mut last_error = ConnectorError::NotConnected;
        for resolved in address.as_str().to_socket_addrs()? {
            match TcpStream::connect_timeout(&resolved, config.timeout) {
                Ok(stream) => {
                    SockRef::from(&stream).set_keepalive(true)?;
                    stream.set_read_timeout(Some(config.poll_interval))?;
                    let reader = BufReader::new(stream.try_clone()?);
                    return Ok(Self {
                        stream,
                        reader,
                        partial: String::new(),
                    });
                }
                Err(err) => last_error = err.into(),
            }
        }
        Err(last_error)
    }

    /// Wait up to one poll interval for a complete reply line.
    ///
    /// Returns `Ok(None)` when no complete line arrived in time; whatever
    /// bytes did arrive stay in `partial` for the next poll.
    fn poll_line(&mut self) -> Result<Option<String>> {
        match self.reader.read_line(&mut self.partial) {
            Ok(0) => Err(ConnectorError::Io("connection closed by peer".to_string())),
            Ok(_) => {
                let line = std::mem::take(&mut self.partial);
                Ok(Some(line.trim_end().to_string()))
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn send_line(&mut self, line: &str) -> Result<()> {
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()?;
        Ok(())
    }
}

/// Single point of truth for connectivity to one HEOS controller and for
/// execution of every device-facing operation.
///
/// The socket is a single shared mutable resource and the protocol allows
/// one in-flight command at a time, so the connection sits behind a mutex
/// that is held across reconnects and across each entire
/// write-then-await-reply exchange. Responses therefore always correlate to
/// the command that most recently wrote to the socket; pipelining is
/// impossible by construction.
///
/// Session-state facts (signed-in, grouped, playing) are re-queried fresh by
/// every operation that needs them: the device is the sole source of truth
/// and its state changes out-of-band, e.g. when a user groups players from
/// another app.
pub struct HeosConnector {
    config: ConnectorConfig,
    link: Mutex<Option<Link>>,
    players: RwLock<Catalog>,
    stations: RwLock<Catalog>,
    playlists: RwLock<Catalog>,
}

impl HeosConnector {
    /// Create a connector and attempt the initial connection.
    ///
    /// A failed connection attempt is logged, not raised; the state is
    /// observable afterwards only through [`is_connected`](Self::is_connected).
    pub fn new(config: ConnectorConfig) -> Self {
        let connector = Self {
            config,
            link: Mutex::new(None),
            players: RwLock::new(Catalog::new()),
            stations: RwLock::new(Catalog::new()),
            playlists: RwLock::new(Catalog::new()),
        };
        connector.connect();
        connector
    }

    /// (Re)connect to the controller, closing any previous connection first.
    ///
    /// Never raises: on failure the connector is simply left disconnected.
    pub fn connect(&self) {
        let mut guard = self.lock_link();
        if guard.take().is_some() {
            info!(host = %self.config.host, "closing previous connection");
        }
        info!(host = %self.config.host, port = self.config.port, "connecting to HEOS system");
        match Link::open(&self.config) {
            Ok(link) => *guard = Some(link),
            Err(err) => {
                error!(
                    host = %self.config.host,
                    port = self.config.port,
                    error = %err,
                    "could not connect to HEOS system"
                );
            }
        }
    }

    /// Whether the controller answers a heartbeat.
    ///
    /// This is the only connectivity signal there is: a socket can be open
    /// yet non-responsive, and that counts as disconnected.
    pub fn is_connected(&self) -> bool {
        self.command_indicates("system/heart_beat", "", RESULT_SUCCESS)
    }

    /// Start playback on a player, ungrouping it first if grouped.
    pub fn play(&self, player_id: &str) -> bool {
        if self.is_grouped(player_id) {
            self.ungroup(player_id);
        }
        self.set_play_state(player_id, "play")
    }

    /// Stop playback on a player, ungrouping it first if grouped.
    pub fn stop(&self, player_id: &str) -> bool {
        if self.is_grouped(player_id) {
            self.ungroup(player_id);
        }
        self.set_play_state(player_id, "stop")
    }

    /// Set the volume (0–100) of a player.
    pub fn volume(&self, player_id: &str, level: u8) -> bool {
        self.command_indicates(
            "player/set_volume",
            &format!("?pid={player_id}&level={level}"),
            RESULT_SUCCESS,
        )
    }

    /// Play a favorite station on a player.
    ///
    /// Ungroups the player if grouped and signs in if the session is signed
    /// out before issuing the stream command.
    pub fn station(&self, player_id: &str, station_id: &str) -> bool {
        if self.is_grouped(player_id) {
            self.ungroup(player_id);
        }
        if !self.is_user_signed_in(&self.config.username) {
            self.sign_in();
        }
        let success = self.command_indicates(
            "browse/play_stream",
            &format!("?pid={player_id}&sid={FAVORITES_SID}&mid={station_id}"),
            RESULT_SUCCESS,
        );
        if !success {
            warn!(station_id, player_id, "could not play station");
        }
        success
    }

    /// Queue a playlist on a player, replacing the current queue.
    ///
    /// Same preconditions as [`station`](Self::station).
    pub fn playlist(&self, player_id: &str, playlist_id: &str) -> bool {
        if self.is_grouped(player_id) {
            self.ungroup(player_id);
        }
        if !self.is_user_signed_in(&self.config.username) {
            self.sign_in();
        }
        // aid=4 replaces the queue and starts playback
        let success = self.command_indicates(
            "browse/add_to_queue",
            &format!("?pid={player_id}&sid={PLAYLISTS_SID}&cid={playlist_id}&aid=4"),
            RESULT_SUCCESS,
        );
        if !success {
            warn!(playlist_id, player_id, "could not play playlist");
        }
        success
    }

    /// Play a named input of one player on another, ungrouping first if
    /// grouped.
    pub fn input(&self, player_id: &str, input_player_id: &str, input_name: &str) -> bool {
        if self.is_grouped(player_id) {
            self.ungroup(player_id);
        }
        let success = self.command_indicates(
            "browse/play_input",
            &format!("?pid={player_id}&spid={input_player_id}&input={input_name}"),
            RESULT_SUCCESS,
        );
        if !success {
            warn!(input_name, input_player_id, player_id, "could not play input");
        }
        success
    }

    /// Whether a player is currently playing.
    pub fn is_playing(&self, player_id: &str) -> bool {
        self.command_indicates(
            "player/get_play_state",
            &format!("?pid={player_id}"),
            STATE_PLAY,
        )
    }

    /// Whether the given user is signed in on the controller.
    pub fn is_user_signed_in(&self, username: &str) -> bool {
        self.command_indicates(
            "system/check_account",
            "",
            &format!("signed_in&un={username}"),
        )
    }

    /// Whether a player is part of a group.
    pub fn is_grouped(&self, player_id: &str) -> bool {
        self.command_indicates("group/get_groups", "", &format!("\"pid\": {player_id}"))
    }

    /// Sign in with the configured credentials.
    pub fn sign_in(&self) -> bool {
        self.command_indicates(
            "system/sign_in",
            &format!("?un={}&pw={}", self.config.username, self.config.password),
            RESULT_SUCCESS,
        )
    }

    /// Clear a player's grouping by setting its group to just itself.
    pub fn ungroup(&self, player_id: &str) -> bool {
        self.command_indicates("group/set_group", &format!("?pid={player_id}"), RESULT_SUCCESS)
    }

    /// What a player is currently playing: the station name if any,
    /// otherwise the song, otherwise an empty string.
    pub fn get_now_playing(&self, player_id: &str) -> String {
        match self.send_command("player/get_now_playing_media", &format!("?pid={player_id}")) {
            Some(reply) => catalog::parse_now_playing(&reply),
            None => {
                warn!(player_id, "could not get now playing");
                String::new()
            }
        }
    }

    /// Re-query the controller for the available players.
    pub fn update_players(&self) {
        let players = self.fetch_players();
        *self.write_catalog(&self.players) = players;
    }

    /// The cached player catalog (pid → name).
    pub fn get_players(&self) -> Catalog {
        self.read_catalog(&self.players)
    }

    /// Re-query the controller for the favorite stations.
    pub fn update_stations(&self) {
        let stations = self.fetch_stations();
        *self.write_catalog(&self.stations) = stations;
    }

    /// The cached station catalog (mid → name).
    pub fn get_stations(&self) -> Catalog {
        self.read_catalog(&self.stations)
    }

    /// Re-query the controller for the playlists.
    pub fn update_playlists(&self) {
        let playlists = self.fetch_playlists();
        *self.write_catalog(&self.playlists) = playlists;
    }

    /// The cached playlist catalog (cid → name).
    pub fn get_playlists(&self) -> Catalog {
        self.read_catalog(&self.playlists)
    }

    /// Issue a raw command and await its reply.
    ///
    /// Returns the final reply line verbatim, or `None` on invalid input,
    /// I/O failure, a mismatched reply, or timeout. This is the sentinel
    /// boundary: no failure here propagates as an error.
    pub fn send_command(&self, name: &str, arguments: &str) -> Option<String> {
        let command = match Command::new(name, arguments) {
            Ok(command) => command,
            Err(err) => {
                error!(error = %err, "invalid command arguments");
                return None;
            }
        };
        match self.exchange(&command) {
            Ok(reply) => Some(reply),
            Err(ConnectorError::Timeout(_)) => {
                warn!(command = name, "timeout while sending command");
                None
            }
            Err(err) => {
                error!(command = name, error = %err, "error while sending command");
                None
            }
        }
    }

    /// One serialized exchange: write the command line, then read reply
    /// lines until the final one for this command arrives or the deadline
    /// passes.
    ///
    /// A reply for a different command means the channel is desynchronized;
    /// the exchange aborts immediately rather than reading on. The offending
    /// line has already been consumed off the stream at that point, so it
    /// cannot leak into the next exchange's wait loop. Interim
    /// "command under process" acknowledgments are discarded and the wait
    /// continues.
    fn exchange(&self, command: &Command) -> Result<String> {
        let mut guard = self.lock_link();
        let link = guard.as_mut().ok_or(ConnectorError::NotConnected)?;

        let wire = command.wire_form();
        debug!(command = %wire, "sending command");
        link.send_line(&wire)?;

        let deadline = Instant::now() + self.config.timeout;
        loop {
            if let Some(line) = link.poll_line()? {
                if !line.is_empty() {
                    match classify(&line, command.name()) {
                        ResponseClass::Mismatch => {
                            error!(command = %wire, reply = %line, "response did not match command");
                            return Err(ConnectorError::Mismatch(command.name().to_string()));
                        }
                        ResponseClass::Pending => {
                            debug!(command = command.name(), "command under process");
                        }
                        ResponseClass::Final => {
                            debug!(reply = %line, "received response");
                            return Ok(line);
                        }
                    }
                }
            }
            if Instant::now() >= deadline {
                return Err(ConnectorError::Timeout(command.name().to_string()));
            }
        }
    }

    /// Issue a command and check its reply for the expected token.
    fn command_indicates(&self, name: &str, arguments: &str, token: &str) -> bool {
        match self.send_command(name, arguments) {
            Some(reply) => indicates(&reply, token),
            None => false,
        }
    }

    fn set_play_state(&self, player_id: &str, state: &str) -> bool {
        self.command_indicates(
            "player/set_play_state",
            &format!("?pid={player_id}&state={state}"),
            RESULT_SUCCESS,
        )
    }

    fn fetch_players(&self) -> Catalog {
        match self.send_command("player/get_players", "") {
            Some(reply) => catalog::parse_players(&reply),
            None => {
                warn!("could not get players");
                Catalog::new()
            }
        }
    }

    fn fetch_stations(&self) -> Catalog {
        if !self.is_user_signed_in(&self.config.username) {
            self.sign_in();
        }
        match self.send_command("browse/browse", &format!("?sid={}", FAVORITES_SID)) {
            Some(reply) => catalog::parse_stations(&reply),
            None => {
                warn!("could not get stations");
                Catalog::new()
            }
        }
    }

    fn fetch_playlists(&self) -> Catalog {
        if !self.is_user_signed_in(&self.config.username) {
            self.sign_in();
        }
        match self.send_command("browse/browse", &format!("?sid={}", PLAYLISTS_SID)) {
            Some(reply) => catalog::parse_playlists(&reply),
            None => {
                warn!("could not get playlists");
                Catalog::new()
            }
        }
    }

    /// The connection lock, recovered if a previous holder panicked.
    fn lock_link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_catalog(&self, catalog: &RwLock<Catalog>) -> Catalog {
        catalog
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn write_catalog<'a>(
        &self,
        catalog: &'a RwLock<Catalog>,
    ) -> std::sync::RwLockWriteGuard<'a, Catalog> {
        catalog.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Timing knobs, exposed for the exchange loop's callers and tests.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// See [`timeout`](Self::timeout).
    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }
}
