//! Cast device control, behind traits so loops can run against fakes.

pub mod chromecast;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;

pub const IMAGE_MIME: &str = "image/jpeg";

/// Resolves a friendly name to a live session.
#[async_trait]
pub trait CastConnector: Send + Sync {
    /// # Errors
    /// [`Error::DeviceNotFound`] when nothing answers to `name`;
    /// [`Error::Device`] when the device is found but refuses the session.
    async fn connect(&self, name: &str) -> Result<Box<dyn CastSession>, Error>;
}

/// An open session on one device.
#[async_trait]
pub trait CastSession: Send {
    /// Ask the device to display `url`.
    async fn load(&mut self, url: &str, mime: &str) -> Result<(), Error>;

    /// Wait until the device reports the last load as active. `Ok(false)` on timeout.
    async fn await_active(&mut self, timeout: Duration) -> Result<bool, Error>;

    /// Stop playback and quit the receiver app. Best effort.
    async fn release(&mut self);
}
