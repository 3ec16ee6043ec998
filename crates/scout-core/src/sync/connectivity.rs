//! Connectivity tracking and became-connected edge detection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ConnectivityMonitor;
use crate::error::{Error, Result};

const EVENT_CHANNEL_CAPACITY: usize = 8;
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkState {
    Unknown,
    Online,
    Offline,
}

/// Turns a stream of online/offline readings into became-connected edges.
///
/// Fires once per transition into online from offline or unknown; steady
/// readings and transitions into offline never fire.
#[derive(Debug)]
pub struct ConnectivityEdge {
    state: LinkState,
}

impl ConnectivityEdge {
    pub const fn new() -> Self {
        Self {
            state: LinkState::Unknown,
        }
    }

    /// Record a reading. Returns `true` when it completes a became-connected edge.
    pub fn observe(&mut self, online: bool) -> bool {
        let next = if online {
            LinkState::Online
        } else {
            LinkState::Offline
        };
        let fired = next == LinkState::Online && self.state != LinkState::Online;
        self.state = next;
        fired
    }

    pub fn is_online(&self) -> bool {
        self.state == LinkState::Online
    }
}

impl Default for ConnectivityEdge {
    fn default() -> Self {
        Self::new()
    }
}

/// Connectivity monitor fed by explicit status pushes.
#[derive(Debug)]
pub struct ManualConnectivity {
    edge: Mutex<ConnectivityEdge>,
    online: AtomicBool,
    connected: broadcast::Sender<()>,
}

impl ManualConnectivity {
    pub fn new() -> Self {
        let (connected, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            edge: Mutex::new(ConnectivityEdge::new()),
            online: AtomicBool::new(false),
            connected,
        }
    }

    /// Start in a known state without emitting an edge.
    pub fn with_status(online: bool) -> Self {
        let monitor = Self::new();
        monitor
            .edge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(online);
        monitor.online.store(online, Ordering::SeqCst);
        monitor
    }

    /// Push a status reading, broadcasting on a became-connected edge.
    pub fn set_online(&self, online: bool) {
        let fired = self
            .edge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(online);
        self.online.store(online, Ordering::SeqCst);

        if fired {
            tracing::info!("Connectivity restored");
            let _ = self.connected.send(());
        } else if !online {
            tracing::debug!("Connectivity reading: offline");
        }
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor for ManualConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn on_became_connected(&self) -> broadcast::Receiver<()> {
        self.connected.subscribe()
    }
}

/// Connectivity monitor that periodically opens a TCP connection to the
/// server host and treats success as online.
#[derive(Debug, Clone)]
pub struct ProbeConnectivity {
    address: String,
    status: Arc<ManualConnectivity>,
}

impl ProbeConnectivity {
    /// Probe the host and port of `server_url`.
    pub fn for_server_url(server_url: &str) -> Result<Self> {
        Ok(Self {
            address: probe_address(server_url)?,
            status: Arc::new(ManualConnectivity::new()),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Run one probe and feed the result into the edge detector.
    pub async fn probe_once(&self) -> bool {
        let online = matches!(
            tokio::time::timeout(PROBE_CONNECT_TIMEOUT, TcpStream::connect(&self.address)).await,
            Ok(Ok(_))
        );
        self.status.set_online(online);
        online
    }

    /// Probe every `interval` until `cancel` fires.
    pub fn spawn(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let probe = self.clone();
        tokio::spawn(async move {
            tracing::debug!("Connectivity probe started for {}", probe.address);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        probe.probe_once().await;
                    }
                }
            }
            tracing::debug!("Connectivity probe stopped");
        })
    }
}

impl ConnectivityMonitor for ProbeConnectivity {
    fn is_online(&self) -> bool {
        self.status.is_online()
    }

    fn on_became_connected(&self) -> broadcast::Receiver<()> {
        self.status.on_became_connected()
    }
}

fn probe_address(server_url: &str) -> Result<String> {
    let url = reqwest::Url::parse(server_url.trim())
        .map_err(|error| Error::InvalidInput(format!("invalid server url: {error}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidInput("server url has no host".to_string()))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::InvalidInput("server url has no port".to_string()))?;
    Ok(format!("{host}:{port}"))
}
