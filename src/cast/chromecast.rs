//! Google Cast backend: mDNS discovery by friendly name, CASTV2 control via `rust_cast`.
//!
//! `rust_cast` connections borrow their host string and are not `Send`, so every
//! command opens a fresh connection on the blocking pool and rejoins the
//! receiver app launched at connect time.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use rust_cast::CastDevice;
use rust_cast::channels::media::{Media, PlayerState, StreamType};
use rust_cast::channels::receiver::CastDeviceApp;
use tracing::{debug, info, instrument};

use super::{CastConnector, CastSession};
use crate::error::Error;

const CAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";
const DEFAULT_CAST_PORT: u16 = 8009;
const RECEIVER_ID: &str = "receiver-0";
const STATUS_POLL: Duration = Duration::from_millis(250);

pub struct ChromecastConnector {
    discovery_timeout: Duration,
}

impl ChromecastConnector {
    pub fn new(discovery_timeout: Duration) -> Self {
        Self { discovery_timeout }
    }
}

#[async_trait]
impl CastConnector for ChromecastConnector {
    #[instrument(skip(self))]
    async fn connect(&self, name: &str) -> Result<Box<dyn CastSession>, Error> {
        let addr = match literal_address(name) {
            Some(addr) => addr,
            None => {
                let wanted = name.to_owned();
                let timeout = self.discovery_timeout;
                tokio::task::spawn_blocking(move || discover(&wanted, timeout))
                    .await
                    .map_err(|err| Error::Device(err.to_string()))??
            }
        };
        info!(%addr, "cast device located");

        let host = addr.ip().to_string();
        let port = addr.port();
        let app = tokio::task::spawn_blocking(move || launch_receiver(&host, port))
            .await
            .map_err(|err| Error::Device(err.to_string()))??;

        Ok(Box::new(ChromecastSession {
            name: name.to_owned(),
            host: addr.ip().to_string(),
            port,
            app: Some(app),
            media_session_id: None,
        }))
    }
}

/// Names that are already `ip` or `ip:port` skip discovery.
fn literal_address(name: &str) -> Option<SocketAddr> {
    if let Ok(addr) = name.parse::<SocketAddr>() {
        return Some(addr);
    }
    name.parse::<IpAddr>()
        .ok()
        .map(|ip| SocketAddr::new(ip, DEFAULT_CAST_PORT))
}

fn discover(name: &str, timeout: Duration) -> Result<SocketAddr, Error> {
    let mdns = ServiceDaemon::new().map_err(|err| Error::Device(format!("mDNS daemon: {err}")))?;
    let receiver = mdns
        .browse(CAST_SERVICE_TYPE)
        .map_err(|err| Error::Device(format!("mDNS browse: {err}")))?;

    let deadline = Instant::now() + timeout;
    let mut found = None;
    while found.is_none() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let Ok(event) = receiver.recv_timeout(remaining) else {
            break;
        };
        if let ServiceEvent::ServiceResolved(info) = event {
            let friendly = info
                .get_properties()
                .get("fn")
                .map(|v| v.val_str().to_owned())
                .unwrap_or_else(|| info.get_fullname().to_owned());
            debug!(device = %friendly, "cast device advertised");
            if !friendly.eq_ignore_ascii_case(name) {
                continue;
            }
            let addresses = info.get_addresses();
            let ip = addresses
                .iter()
                .find(|ip| ip.is_ipv4())
                .or_else(|| addresses.iter().next())
                .copied();
            found = ip.map(|ip| SocketAddr::new(ip, info.get_port()));
        }
    }

    let _ = mdns.stop_browse(CAST_SERVICE_TYPE);
    let _ = mdns.shutdown();
    found.ok_or_else(|| Error::DeviceNotFound(name.to_owned()))
}

#[derive(Debug, Clone)]
struct ReceiverApp {
    session_id: String,
    transport_id: String,
}

fn device_error(context: &str) -> impl Fn(rust_cast::errors::Error) -> Error + '_ {
    move |err| Error::Device(format!("{context}: {err}"))
}

fn open(host: &str, port: u16) -> Result<CastDevice<'_>, Error> {
    let device = CastDevice::connect_without_host_verification(host, port)
        .map_err(device_error("connect"))?;
    device
        .connection
        .connect(RECEIVER_ID)
        .map_err(device_error("receiver connect"))?;
    Ok(device)
}

fn launch_receiver(host: &str, port: u16) -> Result<ReceiverApp, Error> {
    let device = open(host, port)?;
    let app = device
        .receiver
        .launch_app(&CastDeviceApp::DefaultMediaReceiver)
        .map_err(device_error("launch receiver"))?;
    debug!(session = %app.session_id, transport = %app.transport_id, "receiver launched");
    Ok(ReceiverApp {
        session_id: app.session_id,
        transport_id: app.transport_id,
    })
}

/// Reopen a connection already joined to the app's transport.
fn rejoin<'a>(host: &'a str, port: u16, app: &ReceiverApp) -> Result<CastDevice<'a>, Error> {
    let device = open(host, port)?;
    device
        .connection
        .connect(app.transport_id.clone())
        .map_err(device_error("transport connect"))?;
    Ok(device)
}

/// First non-idle media session, restricted to `expected` once the load
/// reported one.
fn active_session<'a, I>(entries: I, expected: Option<i32>) -> Option<i32>
where
    I: IntoIterator<Item = (i32, &'a PlayerState)>,
{
    entries
        .into_iter()
        .filter(|(id, _)| expected.is_none_or(|want| want == *id))
        .find(|(_, state)| !matches!(state, PlayerState::Idle))
        .map(|(id, _)| id)
}

pub struct ChromecastSession {
    name: String,
    host: String,
    port: u16,
    app: Option<ReceiverApp>,
    media_session_id: Option<i32>,
}

impl ChromecastSession {
    fn app(&self) -> Result<ReceiverApp, Error> {
        self.app
            .clone()
            .ok_or_else(|| Error::Device(format!("{}: session already released", self.name)))
    }
}

#[async_trait]
impl CastSession for ChromecastSession {
    async fn load(&mut self, url: &str, mime: &str) -> Result<(), Error> {
        let app = self.app()?;
        let host = self.host.clone();
        let port = self.port;
        let media = Media {
            content_id: url.to_owned(),
            content_type: mime.to_owned(),
            stream_type: StreamType::Buffered,
            duration: None,
            metadata: None,
        };
        let media_session_id = tokio::task::spawn_blocking(move || -> Result<Option<i32>, Error> {
            let device = rejoin(&host, port, &app)?;
            let status = device
                .media
                .load(app.transport_id.clone(), app.session_id.clone(), &media)
                .map_err(device_error("load"))?;
            Ok(status.entries.first().map(|e| e.media_session_id))
        })
        .await
        .map_err(|err| Error::Device(err.to_string()))??;
        self.media_session_id = media_session_id;
        Ok(())
    }

    async fn await_active(&mut self, timeout: Duration) -> Result<bool, Error> {
        let app = self.app()?;
        let host = self.host.clone();
        let port = self.port;
        let expected = self.media_session_id;
        let active = tokio::task::spawn_blocking(move || -> Result<Option<i32>, Error> {
            let device = rejoin(&host, port, &app)?;
            let deadline = Instant::now() + timeout;
            loop {
                let status = device
                    .media
                    .get_status(app.transport_id.clone(), None)
                    .map_err(device_error("media status"))?;
                let entries = status
                    .entries
                    .iter()
                    .map(|e| (e.media_session_id, &e.player_state));
                if let Some(id) = active_session(entries, expected) {
                    return Ok(Some(id));
                }
                if Instant::now() + STATUS_POLL >= deadline {
                    return Ok(None);
                }
                std::thread::sleep(STATUS_POLL);
            }
        })
        .await
        .map_err(|err| Error::Device(err.to_string()))??;
        match active {
            Some(id) => {
                self.media_session_id = Some(id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release(&mut self) {
        let Some(app) = self.app.take() else {
            return;
        };
        let host = self.host.clone();
        let port = self.port;
        let media_session_id = self.media_session_id.take();
        let name = self.name.clone();
        let outcome = tokio::task::spawn_blocking(move || -> Result<(), Error> {
            let device = rejoin(&host, port, &app)?;
            if let Some(id) = media_session_id {
                device
                    .media
                    .stop(app.transport_id.clone(), id)
                    .map_err(device_error("media stop"))?;
            }
            device
                .receiver
                .stop_app(app.session_id.clone())
                .map_err(device_error("stop app"))?;
            Ok(())
        })
        .await;
        match outcome {
            Ok(Ok(())) => debug!(device = %name, "receiver released"),
            Ok(Err(err)) => debug!(device = %name, error = %err, "release failed"),
            Err(err) => debug!(device = %name, error = %err, "release task failed"),
        }
    }
}
