use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info, warn};

use crate::config::{Config, Transport};
use crate::router::ChannelRouter;
use crate::servo::ServoHandle;
use crate::session::{ControlSession, SessionStats};
use crate::transport::{StreamSource, WebSocketSource};

const ACCEPT_POLL: Duration = Duration::from_millis(50);

#[derive(Clone)]
struct SessionSettings {
    transport: Transport,
    router: ChannelRouter,
    servo: ServoHandle,
    read_buffer_size: usize,
    max_message_size: usize,
    read_timeout: Option<Duration>,
}

/// Accepts remotes and runs each one in its own session thread.
pub struct ControlServer {
    listener: TcpListener,
    settings: SessionSettings,
    max_sessions: Option<usize>,
    shutdown: Arc<AtomicBool>,
}

impl ControlServer {
    pub fn bind(config: &Config, servo: ServoHandle) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address())?;
        listener.set_nonblocking(true)?;

        Ok(ControlServer {
            listener,
            settings: SessionSettings {
                transport: config.transport,
                router: ChannelRouter::new(config.stick, servo.range()),
                servo,
                read_buffer_size: config.read_buffer_size,
                max_message_size: config.max_message_size,
                read_timeout: config.read_timeout_ms.map(Duration::from_millis),
            },
            max_sessions: config.max_sessions,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Setting this flag stops the accept loop within one poll interval.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Accept until shut down or `max_sessions` remotes have been served.
    /// Returns the number of sessions accepted. The listener is released
    /// on return.
    pub fn run(self) -> io::Result<usize> {
        info!("Server listening on {}", self.local_addr()?);

        let mut sessions: Vec<JoinHandle<SessionStats>> = Vec::new();
        let mut accepted = 0;

        while !self.stopping() {
            if self.max_sessions.is_some_and(|max| accepted >= max) {
                info!("Served {} session(s), no longer accepting", accepted);
                self.wait_for(&mut sessions);
                break;
            }

            match self.listener.accept() {
                Ok((stream, addr)) => {
                    info!("Connection from {}", addr);
                    match self.spawn_session(stream, addr) {
                        Ok(handle) => {
                            accepted += 1;
                            sessions.push(handle);
                        }
                        Err(e) => warn!("Could not start session for {}: {}", addr, e),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    error!("Accept error: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
            sessions.retain(|handle| !handle.is_finished());
        }

        Ok(accepted)
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    // Remaining sessions end on their own when their peer disconnects; a
    // shutdown request stops waiting for them.
    fn wait_for(&self, sessions: &mut Vec<JoinHandle<SessionStats>>) {
        while !sessions.is_empty() && !self.stopping() {
            sessions.retain(|handle| !handle.is_finished());
            thread::sleep(ACCEPT_POLL);
        }
    }

    fn spawn_session(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> io::Result<JoinHandle<SessionStats>> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(self.settings.read_timeout)?;
        stream.set_nodelay(true)?;

        let settings = self.settings.clone();
        thread::Builder::new()
            .name(format!("session-{}", addr))
            .spawn(move || handle_connection(stream, addr, settings))
    }
}

fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    settings: SessionSettings,
) -> SessionStats {
    let peer = addr.to_string();
    match settings.transport {
        Transport::Tcp => {
            let source = StreamSource::new(
                stream,
                settings.read_buffer_size,
                settings.max_message_size,
            );
            ControlSession::new(source, peer, settings.router, settings.servo).run()
        }
        Transport::WebSocket => {
            let socket = match tungstenite::accept(stream) {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("WebSocket handshake error from {}: {}", addr, e);
                    return SessionStats::default();
                }
            };
            let source = WebSocketSource::new(socket);
            ControlSession::new(source, peer, settings.router, settings.servo).run()
        }
    }
}
