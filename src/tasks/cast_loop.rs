use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cast::{CastConnector, CastSession, IMAGE_MIME};
use crate::error::Error;
use crate::media::MediaId;
use crate::playlist::PlaylistHandle;
use crate::settings::SettingsHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Connecting,
    Playing,
    Waiting,
    Stopped,
}

/// Why a loop reached `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    DeviceNotFound,
    DeviceFailed,
}

/// Shared inputs every loop reads from.
#[derive(Clone)]
pub struct LoopContext {
    pub playlist: PlaylistHandle,
    pub settings: SettingsHandle,
    pub connector: Arc<dyn CastConnector>,
    /// Externally reachable origin of the image endpoint, without trailing slash.
    pub base_url: String,
    pub ack_timeout: Duration,
}

pub fn image_url(base_url: &str, id: &MediaId) -> String {
    format!("{base_url}/image/{id}.jpg")
}

/// Drive one device until cancelled or the device fails.
#[instrument(skip(ctx, state, cancel))]
pub async fn run(
    device: String,
    ctx: LoopContext,
    state: watch::Sender<LoopState>,
    cancel: CancellationToken,
) -> LoopExit {
    let _ = state.send(LoopState::Connecting);
    let connected = tokio::select! {
        _ = cancel.cancelled() => None,
        res = ctx.connector.connect(&device) => Some(res),
    };
    let mut session = match connected {
        None => {
            let _ = state.send(LoopState::Stopped);
            return LoopExit::Cancelled;
        }
        Some(Ok(session)) => session,
        Some(Err(err)) => {
            let exit = match err {
                Error::DeviceNotFound(_) => LoopExit::DeviceNotFound,
                _ => LoopExit::DeviceFailed,
            };
            warn!(error = %err, "could not connect to cast device");
            let _ = state.send(LoopState::Stopped);
            return exit;
        }
    };
    info!("cast loop connected");

    let exit = play(&ctx, session.as_mut(), &state, &cancel).await;
    session.release().await;
    let _ = state.send(LoopState::Stopped);
    info!(?exit, "cast loop stopped");
    exit
}

async fn play(
    ctx: &LoopContext,
    session: &mut dyn CastSession,
    state: &watch::Sender<LoopState>,
    cancel: &CancellationToken,
) -> LoopExit {
    loop {
        if cancel.is_cancelled() {
            return LoopExit::Cancelled;
        }
        let _ = state.send(LoopState::Playing);

        let Some(slot) = ctx.playlist.current() else {
            // Nothing indexed yet; park without advancing.
            if !pause(ctx.settings.tick(), cancel).await {
                return LoopExit::Cancelled;
            }
            continue;
        };

        let url = image_url(&ctx.base_url, &slot.item.id);
        debug!(%url, position = slot.position, "loading slide");
        let loaded = tokio::select! {
            _ = cancel.cancelled() => return LoopExit::Cancelled,
            res = session.load(&url, IMAGE_MIME) => res,
        };
        if let Err(err) = loaded {
            warn!(error = %err, "device rejected load");
            return LoopExit::DeviceFailed;
        }

        let acked = tokio::select! {
            _ = cancel.cancelled() => return LoopExit::Cancelled,
            res = session.await_active(ctx.ack_timeout) => res,
        };
        match acked {
            Ok(true) => {}
            Ok(false) => warn!(timeout = ?ctx.ack_timeout, %url, "device did not confirm slide"),
            Err(err) => {
                warn!(error = %err, "device status failed");
                return LoopExit::DeviceFailed;
            }
        }

        let _ = state.send(LoopState::Waiting);
        if !wait_interval(&ctx.settings, cancel).await {
            return LoopExit::Cancelled;
        }
        if !ctx.playlist.advance(&slot) {
            debug!("playlist replaced while waiting; advance discarded");
        }
    }
}

/// Returns `false` if cancelled first.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Sleep for the slide interval in tick-sized steps, re-reading the interval
/// each step. Returns `false` if cancelled first.
async fn wait_interval(settings: &SettingsHandle, cancel: &CancellationToken) -> bool {
    let mut elapsed = Duration::ZERO;
    loop {
        let interval = settings.slide_interval();
        if elapsed >= interval {
            return true;
        }
        let step = settings.tick().min(interval - elapsed);
        if !pause(step, cancel).await {
            return false;
        }
        elapsed += step;
    }
}
