use crate::protocol::frame::{Message, Payload};
use crate::protocol::ProtocolError;
use crate::sweep::matrix::FrequencyPowerMatrix;
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub read_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:12345".into(),
            read_timeout_ms: 5_000,
        }
    }
}

/// What the receiving side knows about the sender.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReceiverState {
    pub latest: Option<FrequencyPowerMatrix>,
    pub frames_received: u64,
    pub notices_received: u64,
    pub last_notice: Option<String>,
    pub rejected: u64,
}

/// Receiver state written by connection handlers and read by consumers.
#[derive(Debug, Clone, Default)]
pub struct SharedMatrix {
    inner: Arc<Mutex<ReceiverState>>,
}

impl SharedMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ReceiverState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn replace(&self, matrix: FrequencyPowerMatrix) {
        let mut state = self.lock();
        state.latest = Some(matrix);
        state.frames_received += 1;
    }

    pub fn record_notice(&self, notice: String) {
        let mut state = self.lock();
        state.notices_received += 1;
        state.last_notice = Some(notice);
    }

    pub fn record_rejected(&self) {
        self.lock().rejected += 1;
    }

    pub fn latest(&self) -> Option<FrequencyPowerMatrix> {
        self.lock().latest.clone()
    }

    pub fn snapshot(&self) -> ReceiverState {
        self.lock().clone()
    }
}

/// Accepts relay connections and folds each message into [`SharedMatrix`].
pub struct DistributionServer {
    listener: TcpListener,
    shared: SharedMatrix,
    read_timeout: Duration,
}

impl DistributionServer {
    pub fn bind(addr: &str, shared: SharedMatrix, read_timeout: Duration) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
            shared,
            read_timeout,
        })
    }

    pub fn from_config(config: &ServerConfig, shared: SharedMatrix) -> io::Result<Self> {
        Self::bind(
            &config.bind,
            shared,
            Duration::from_millis(config.read_timeout_ms),
        )
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop on its own thread; every connection gets a
    /// handler thread of its own.
    pub fn spawn(self) -> io::Result<ServerHandle> {
        let addr = self.listener.local_addr()?;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let thread = thread::Builder::new()
            .name("relay-accept".into())
            .spawn(move || self.accept_loop(&stop_flag))?;
        Ok(ServerHandle {
            addr,
            stop,
            thread: Some(thread),
        })
    }

    fn accept_loop(self, stop: &AtomicBool) {
        let logger = LogManager::new("relay-server");
        logger.record(&format!(
            "listening on {}",
            self.listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_default()
        ));
        serve_incoming(
            self.listener.incoming(),
            &self.shared,
            self.read_timeout,
            stop,
            &logger,
        );
        logger.record("accept loop stopped");
    }
}

/// Pause after a failed accept before polling the listener again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

fn serve_incoming<I>(
    incoming: I,
    shared: &SharedMatrix,
    read_timeout: Duration,
    stop: &AtomicBool,
    logger: &LogManager,
) where
    I: IntoIterator<Item = io::Result<TcpStream>>,
{
    for incoming in incoming {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let stream = match incoming {
            Ok(stream) => stream,
            Err(err) => {
                logger.warn(&format!("accept failed: {}", err));
                thread::sleep(ACCEPT_BACKOFF);
                continue;
            }
        };
        let shared = shared.clone();
        let spawned = thread::Builder::new()
            .name("relay-conn".into())
            .spawn(move || {
                let peer = stream
                    .peer_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| "unknown peer".into());
                if let Err(err) = handle_connection(stream, &shared, read_timeout) {
                    shared.record_rejected();
                    LogManager::new("relay-server")
                        .warn(&format!("dropped message from {}: {}", peer, err));
                }
            });
        if let Err(err) = spawned {
            logger.warn(&format!("could not start handler: {}", err));
        }
    }
}

fn handle_connection(
    mut stream: TcpStream,
    shared: &SharedMatrix,
    read_timeout: Duration,
) -> Result<(), ProtocolError> {
    let timeout = (!read_timeout.is_zero()).then_some(read_timeout);
    stream.set_read_timeout(timeout)?;
    let message = Message::read_from(&mut stream)?;
    match message.decode()? {
        Payload::Matrix(matrix) => {
            log::debug!("received matrix with {} rows", matrix.len());
            shared.replace(matrix);
        }
        Payload::Notice(notice) => {
            log::info!("notice: {}", notice);
            shared.record_notice(notice);
        }
    }
    Ok(())
}

/// Owner of a running accept loop. Dropping it stops the loop.
pub struct ServerHandle {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(self) {
        drop(self);
    }

    fn wake_address(&self) -> SocketAddr {
        let mut addr = self.addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(match addr {
                SocketAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
                SocketAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
            });
        }
        addr
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.stop.store(true, Ordering::SeqCst);
        // accept() only notices the flag once a connection arrives
        if TcpStream::connect_timeout(&self.wake_address(), Duration::from_secs(1)).is_ok() {
            let _ = thread.join();
        }
    }
}
