//! Runtime-adjustable slideshow settings shared between the HTTP layer and cast loops.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::Configuration;
use crate::error::Error;
use crate::playlist::{PlaylistOrder, SortKey};

pub const MAX_SLIDE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideSettings {
    pub slide_interval: Duration,
    pub shuffle: bool,
    pub sort: SortKey,
    /// Devices started when a start request names none.
    pub devices: Vec<String>,
    /// Wait granularity; bounds how long a loop takes to notice a stop or a new interval.
    pub tick: Duration,
}

impl SlideSettings {
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            slide_interval: config.cast.slide_interval,
            shuffle: config.playlist.shuffle,
            sort: config.playlist.sort,
            devices: config.cast.devices.clone(),
            tick: config.cast.tick,
        }
    }

    pub fn order(&self) -> PlaylistOrder {
        PlaylistOrder::new(self.shuffle, self.sort)
    }
}

/// Cloneable handle; writes go through validating setters only.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    inner: Arc<RwLock<SlideSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: SlideSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn snapshot(&self) -> SlideSettings {
        self.inner.read().clone()
    }

    pub fn slide_interval(&self) -> Duration {
        self.inner.read().slide_interval
    }

    pub fn tick(&self) -> Duration {
        self.inner.read().tick
    }

    pub fn set_slide_interval(&self, interval: Duration) -> Result<(), Error> {
        if interval.is_zero() {
            return Err(Error::InvalidSetting(
                "slide interval must be greater than zero".into(),
            ));
        }
        if interval > MAX_SLIDE_INTERVAL {
            return Err(Error::InvalidSetting(format!(
                "slide interval must not exceed {}s",
                MAX_SLIDE_INTERVAL.as_secs()
            )));
        }
        self.inner.write().slide_interval = interval;
        Ok(())
    }

    pub fn set_shuffle(&self, shuffle: bool) {
        self.inner.write().shuffle = shuffle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> SettingsHandle {
        SettingsHandle::new(SlideSettings::from_config(&Configuration::default()))
    }

    #[test]
    fn rejects_zero_and_oversized_intervals() {
        let settings = handle();
        assert!(matches!(
            settings.set_slide_interval(Duration::ZERO),
            Err(Error::InvalidSetting(_))
        ));
        assert!(matches!(
            settings.set_slide_interval(MAX_SLIDE_INTERVAL + Duration::from_secs(1)),
            Err(Error::InvalidSetting(_))
        ));
        assert_eq!(settings.slide_interval(), Duration::from_secs(10));
    }

    #[test]
    fn accepted_interval_is_visible_to_clones() {
        let settings = handle();
        let reader = settings.clone();
        settings.set_slide_interval(Duration::from_secs(3)).unwrap();
        assert_eq!(reader.slide_interval(), Duration::from_secs(3));
    }

    #[test]
    fn shuffle_toggles_order() {
        let settings = handle();
        settings.set_shuffle(false);
        assert_eq!(
            settings.snapshot().order(),
            PlaylistOrder::Sorted(SortKey::ModifiedTime)
        );
    }
}
