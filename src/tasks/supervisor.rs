use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cast_loop::{self, LoopContext, LoopExit, LoopState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub device: String,
    pub state: LoopState,
}

struct RunningLoop {
    device: String,
    cancel: CancellationToken,
    state: watch::Receiver<LoopState>,
    handle: JoinHandle<LoopExit>,
}

/// Owns the set of running cast loops.
pub struct CastSupervisor {
    ctx: LoopContext,
    restart_grace: Duration,
    root: CancellationToken,
    loops: Mutex<Vec<RunningLoop>>,
}

impl CastSupervisor {
    pub fn new(ctx: LoopContext, restart_grace: Duration, root: CancellationToken) -> Self {
        Self {
            ctx,
            restart_grace,
            root,
            loops: Mutex::new(Vec::new()),
        }
    }

    /// Replace all running loops with one loop per distinct device name.
    pub async fn start(&self, devices: &[String]) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(devices.len());
        for device in devices {
            let device = device.trim();
            if !device.is_empty() && !names.iter().any(|n| n == device) {
                names.push(device.to_owned());
            }
        }

        let mut loops = self.loops.lock().await;
        let previous = std::mem::take(&mut *loops);
        for running in &previous {
            running.cancel.cancel();
        }
        self.drain(previous).await;

        for device in &names {
            let cancel = self.root.child_token();
            let (state_tx, state_rx) = watch::channel(LoopState::Connecting);
            let handle = tokio::spawn(cast_loop::run(
                device.clone(),
                self.ctx.clone(),
                state_tx,
                cancel.clone(),
            ));
            loops.push(RunningLoop {
                device: device.clone(),
                cancel,
                state: state_rx,
                handle,
            });
        }
        info!(devices = ?names, "cast loops started");
        names
    }

    /// Waits up to the restart grace for cancelled loops to finish.
    async fn drain(&self, previous: Vec<RunningLoop>) {
        if previous.is_empty() {
            return;
        }
        let handles: Vec<_> = previous.into_iter().map(|l| l.handle).collect();
        let joined = tokio::time::timeout(self.restart_grace, futures::future::join_all(handles));
        if joined.await.is_err() {
            warn!(grace = ?self.restart_grace, "previous cast loops still shutting down");
        } else {
            debug!("previous cast loops exited");
        }
    }

    /// Signal every loop to stop; does not wait for them.
    pub async fn stop(&self) {
        let loops = self.loops.lock().await;
        for running in loops.iter() {
            running.cancel.cancel();
        }
        info!(count = loops.len(), "stop requested for cast loops");
    }

    pub async fn devices(&self) -> Vec<DeviceStatus> {
        let loops = self.loops.lock().await;
        loops
            .iter()
            .map(|l| DeviceStatus {
                device: l.device.clone(),
                state: *l.state.borrow(),
            })
            .collect()
    }

    /// Cancel everything and wait for each loop to release its device.
    pub async fn shutdown(&self) {
        let mut loops = self.loops.lock().await;
        for running in loops.iter() {
            running.cancel.cancel();
        }
        for running in loops.drain(..) {
            if let Err(err) = running.handle.await {
                warn!(device = %running.device, error = %err, "cast loop panicked");
            }
        }
    }
}
