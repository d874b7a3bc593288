//! TCP front end for the account API.
//!
//! ```text
//! acceptor ──accept──> session thread ──read one JSON line──> dispatch_tracked
//!    │                      │                                       │
//!    │<── reap: Some(handler thread) ──┘                            v
//!    └── adopt into handler reaper <──────────────── handler writes response
//! ```
//!
//! The acceptor never reads from a socket, so a slow client cannot stall it.
//! On shutdown it closes the read side of every pending session so that
//! blocked reads return at once.

use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::collections::BTreeMap;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use courier_dispatch::{
    AccountStore, ApiRequest, ApiResponse, ConnectionContext, Dispatcher, HandlerTable, status,
};
use courier_thread::{
    Reaper, ThreadError, ThreadKey, ThreadManager, ThreadOutcome, TrackedThread, cancel,
};

const MAX_REQUEST_BYTES: u64 = 64 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_POLL: Duration = Duration::from_millis(25);

/// One accepted client, handed to exactly one handler.
pub struct TcpConnection {
    stream: TcpStream,
    peer: String,
    request: ApiRequest,
    accounts: Arc<dyn AccountStore>,
    responded: bool,
}

impl ConnectionContext for TcpConnection {
    fn request(&self) -> &ApiRequest {
        &self.request
    }

    fn respond(&mut self, response: ApiResponse) {
        if self.responded {
            tracing::warn!(peer = %self.peer, "Handler responded twice; dropping second response");
            return;
        }
        self.responded = true;
        if let Err(err) = write_response(&self.stream, &response) {
            tracing::warn!(peer = %self.peer, "Failed to write response: {err}");
        }
    }

    fn accounts(&self) -> &dyn AccountStore {
        self.accounts.as_ref()
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}

fn write_response(mut stream: &TcpStream, response: &ApiResponse) -> io::Result<()> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    stream.write_all(&line)?;
    stream.flush()
}

fn reply(stream: &TcpStream, peer: SocketAddr, response: &ApiResponse) {
    if let Err(err) = write_response(stream, response) {
        tracing::debug!(%peer, "Failed to write response: {err}");
    }
}

fn read_request(stream: &TcpStream) -> Result<ApiRequest, ApiResponse> {
    let mut reader = BufReader::new(stream.take(MAX_REQUEST_BYTES));
    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) => Err(ApiResponse::error(status::BAD_REQUEST, "empty request")),
        Ok(_) => serde_json::from_str(line.trim()).map_err(|err| {
            ApiResponse::error(status::BAD_REQUEST, format!("malformed request: {err}"))
        }),
        Err(err) => Err(ApiResponse::error(
            status::BAD_REQUEST,
            format!("could not read request: {err}"),
        )),
    }
}

type Session = Option<TrackedThread<TcpConnection>>;

/// Runs on a session thread: read the request and start its handler.
fn open_session(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: &Dispatcher<TcpConnection>,
    accounts: Arc<dyn AccountStore>,
) -> Session {
    if let Err(err) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
        tracing::warn!(%peer, "Failed to set read timeout: {err}");
    }
    let request = read_request(&stream);
    // Shutdown cuts reads short, so a failed read may just mean we are stopping.
    if cancel::checkpoint().is_err() {
        reply(
            &stream,
            peer,
            &ApiResponse::error(status::SERVICE_UNAVAILABLE, "server is shutting down"),
        );
        return None;
    }
    let request = match request {
        Ok(request) => request,
        Err(response) => {
            tracing::debug!(%peer, status = response.status, "Rejected request");
            reply(&stream, peer, &response);
            return None;
        }
    };

    let reply_stream = stream.try_clone();
    let verb = request.method.clone();
    let con = TcpConnection {
        stream,
        peer: peer.to_string(),
        request,
        accounts,
        responded: false,
    };
    match dispatcher.dispatch_tracked(&verb, con) {
        Ok(handler) => Some(handler),
        Err(err) => {
            if let Ok(stream) = reply_stream {
                reply(&stream, peer, &ApiResponse::error(err.status(), err.to_string()));
            }
            None
        }
    }
}

/// Counters reported when the server stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
    pub accepted: u64,
    /// Connections turned away because no session thread could be started.
    pub rejected: u64,
    pub handled: u64,
    pub failed: u64,
}

pub struct Server {
    listener: TcpListener,
    manager: Arc<ThreadManager>,
    dispatcher: Dispatcher<TcpConnection>,
    accounts: Arc<dyn AccountStore>,
    sessions: Reaper<Session>,
    /// Clones of the sockets owned by session threads, for waking blocked reads.
    session_streams: BTreeMap<ThreadKey, TcpStream>,
    handlers: Reaper<TcpConnection>,
    stats: ServeStats,
}

impl Server {
    pub fn bind(
        addr: SocketAddr,
        manager: Arc<ThreadManager>,
        accounts: Arc<dyn AccountStore>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let dispatcher = Dispatcher::new(Arc::clone(&manager), HandlerTable::account_api());
        Ok(Self {
            listener,
            manager,
            dispatcher,
            accounts,
            sessions: Reaper::new(),
            session_streams: BTreeMap::new(),
            handlers: Reaper::new(),
            stats: ServeStats::default(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `stop` is set, then cancel and join every
    /// outstanding thread.
    pub fn run(mut self, stop: &AtomicBool) -> ServeStats {
        while !stop.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => self.accept(stream, peer),
                Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    tracing::warn!("Accept failed: {err}");
                    thread::sleep(ACCEPT_POLL);
                }
            }
            self.reap();
        }
        self.shutdown()
    }

    fn accept(&mut self, stream: TcpStream, peer: SocketAddr) {
        self.stats.accepted += 1;
        // Accepted sockets inherit O_NONBLOCK from the listener on some
        // platforms.
        if let Err(err) = stream.set_nonblocking(false) {
            tracing::warn!(%peer, "Failed to make connection blocking: {err}");
            return;
        }

        let clone = stream.try_clone();
        let dispatcher = self.dispatcher.clone();
        let accounts = Arc::clone(&self.accounts);
        match self
            .manager
            .launch_allocated(move || open_session(stream, peer, &dispatcher, accounts))
        {
            Ok(session) => {
                let key = self.sessions.adopt(session);
                match clone {
                    Ok(stream) => {
                        self.session_streams.insert(key, stream);
                    }
                    Err(err) => tracing::warn!(%peer, %key, "Failed to clone connection: {err}"),
                }
                tracing::debug!(%peer, %key, "Connection accepted");
            }
            Err(err) => {
                self.stats.rejected += 1;
                tracing::warn!(%peer, code = err.code(), "Turning connection away: {err}");
                if let Ok(stream) = clone {
                    reply(
                        &stream,
                        peer,
                        &ApiResponse::error(status::SERVICE_UNAVAILABLE, "server busy"),
                    );
                }
            }
        }
    }

    fn reap(&mut self) {
        for (key, outcome) in self.sessions.reap_finished() {
            self.settle_session(key, outcome);
        }
        for (key, outcome) in self.handlers.reap_finished() {
            self.settle_handler(key, outcome);
        }
    }

    fn settle_session(
        &mut self,
        key: ThreadKey,
        outcome: Result<ThreadOutcome<Session>, ThreadError>,
    ) {
        self.session_streams.remove(&key);
        match outcome {
            Ok(ThreadOutcome::Finished(Some(handler))) => {
                self.handlers.adopt(handler);
            }
            Ok(ThreadOutcome::Finished(None) | ThreadOutcome::Cancelled) => {}
            Ok(ThreadOutcome::Panicked(message)) => {
                self.stats.failed += 1;
                tracing::error!(%key, "Session thread panicked: {message}");
            }
            Err(err) => {
                self.stats.failed += 1;
                tracing::warn!(%key, "Could not reap session thread: {err}");
            }
        }
    }

    fn settle_handler(
        &mut self,
        key: ThreadKey,
        outcome: Result<ThreadOutcome<TcpConnection>, ThreadError>,
    ) {
        match outcome {
            Ok(ThreadOutcome::Finished(con)) => {
                self.stats.handled += 1;
                if !con.responded {
                    tracing::warn!(peer = %con.peer, method = %con.request.method, "Handler returned without responding");
                }
            }
            Ok(ThreadOutcome::Cancelled) => {
                tracing::debug!(%key, "Handler cancelled");
            }
            Ok(ThreadOutcome::Panicked(message)) => {
                self.stats.failed += 1;
                tracing::error!(%key, "Handler panicked: {message}");
            }
            Err(err) => {
                self.stats.failed += 1;
                tracing::warn!(%key, "Could not reap handler thread: {err}");
            }
        }
    }

    fn shutdown(mut self) -> ServeStats {
        tracing::info!(
            sessions = self.sessions.len(),
            handlers = self.handlers.len(),
            "Stopping acceptor"
        );
        // Latch cancel first so a session woken below reports the shutdown.
        let waiting = self.sessions.cancel_all();
        tracing::debug!(waiting, "Waking session threads");
        for (key, stream) in &self.session_streams {
            if let Err(err) = stream.shutdown(Shutdown::Read) {
                tracing::debug!(%key, "Failed to close session read side: {err}");
            }
        }
        for (key, outcome) in self.sessions.shutdown() {
            self.settle_session(key, outcome);
        }
        for (key, outcome) in self.handlers.shutdown() {
            self.settle_handler(key, outcome);
        }
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    use courier_dispatch::MemoryAccountStore;
    use courier_types::ThreadConfig;
    use serde_json::json;

    fn roundtrip(addr: SocketAddr, line: &str) -> ApiResponse {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(line.as_bytes()).unwrap();
        stream.write_all(b"\n").unwrap();
        let mut response = String::new();
        BufReader::new(&stream).read_line(&mut response).unwrap();
        serde_json::from_str(&response).unwrap()
    }

    #[test]
    fn serves_account_api_over_tcp() {
        let manager = Arc::new(ThreadManager::new(ThreadConfig::default()));
        let server = Server::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::clone(&manager),
            Arc::new(MemoryAccountStore::new()),
        )
        .unwrap();
        let addr = server.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let runner = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || server.run(&stop))
        };

        let register = json!({
            "method": "REGISTER",
            "params": { "username": "nora", "password": "nora-password" },
        });
        assert_eq!(roundtrip(addr, &register.to_string()).status, status::CREATED);

        let auth = json!({
            "method": "auth",
            "params": { "username": "nora", "password": "nora-password" },
        });
        let response = roundtrip(addr, &auth.to_string());
        assert_eq!(response.status, status::OK);
        assert_eq!(response.body["authenticated"], json!(true));

        let unknown = roundtrip(addr, r#"{"method":"LIST_USERS"}"#);
        assert_eq!(unknown.status, status::NOT_FOUND);

        let garbage = roundtrip(addr, "not json");
        assert_eq!(garbage.status, status::BAD_REQUEST);

        stop.store(true, Ordering::SeqCst);
        let stats = runner.join().unwrap();
        assert_eq!(stats.accepted, 4);
        assert_eq!(stats.rejected, 0);
        assert_eq!(stats.handled, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(manager.live_threads(), 0);
        assert_eq!(manager.tracked_threads(), 0);
    }

    #[test]
    fn shutdown_wakes_idle_sessions() {
        let manager = Arc::new(ThreadManager::new(ThreadConfig::default()));
        let server = Server::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::clone(&manager),
            Arc::new(MemoryAccountStore::new()),
        )
        .unwrap();
        let addr = server.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let runner = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || server.run(&stop))
        };

        // Connects but never sends a request.
        let idle = TcpStream::connect(addr).unwrap();
        // Accepts are served in order, so the idle client has a session once
        // this answer arrives.
        let unknown = roundtrip(addr, r#"{"method":"NOOP"}"#);
        assert_eq!(unknown.status, status::NOT_FOUND);

        let start = Instant::now();
        stop.store(true, Ordering::SeqCst);
        let stats = runner.join().unwrap();
        assert!(start.elapsed() < READ_TIMEOUT / 2);
        assert_eq!(stats.accepted, 2);
        assert_eq!(manager.live_threads(), 0);

        let mut response = String::new();
        BufReader::new(&idle).read_line(&mut response).unwrap();
        let response: ApiResponse = serde_json::from_str(&response).unwrap();
        assert_eq!(response.status, status::SERVICE_UNAVAILABLE);
    }
}
