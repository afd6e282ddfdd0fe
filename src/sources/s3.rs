//! S3-compatible object storage via presigned `ListObjectsV2` / `GetObject` URLs.

use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rusty_s3::actions::ListObjectsV2;
use rusty_s3::{Bucket, Credentials, S3Action, UrlStyle};
use tracing::{debug, instrument};
use url::Url;

use super::{IncludeFilter, SourceAdapter, SourceEntry, file_name_of};
use crate::config::ObjectStorageConfig;
use crate::error::Error;
use crate::media::SourceKind;

const SIGN_TTL: Duration = Duration::from_secs(300);

pub struct ObjectStorageSource {
    client: Client,
    bucket: Bucket,
    credentials: Credentials,
    prefix: String,
    include: IncludeFilter,
}

impl ObjectStorageSource {
    pub fn new(cfg: &ObjectStorageConfig, include: IncludeFilter, client: Client) -> Result<Self> {
        let name = cfg.bucket.clone().context("s3 source requires `bucket`")?;
        let endpoint = match cfg.endpoint_url.as_deref() {
            Some(raw) => raw.to_owned(),
            None => format!("https://s3.{}.amazonaws.com", cfg.region),
        };
        let endpoint =
            Url::parse(&endpoint).with_context(|| format!("invalid s3 endpoint {endpoint:?}"))?;
        let style = if cfg.path_style {
            UrlStyle::Path
        } else {
            UrlStyle::VirtualHost
        };
        let bucket = Bucket::new(endpoint, style, name, cfg.region.clone())
            .context("invalid s3 bucket configuration")?;
        let credentials = Credentials::new(
            cfg.access_key.clone().context("s3 source requires `access-key`")?,
            cfg.secret_key.clone().context("s3 source requires `secret-key`")?,
        );
        Ok(Self {
            client,
            bucket,
            credentials,
            prefix: cfg.prefix.clone(),
            include,
        })
    }

    async fn list_all(&self) -> Result<Vec<SourceEntry>> {
        let listed_at = SystemTime::now();
        let mut out = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut action = self.bucket.list_objects_v2(Some(&self.credentials));
            if !self.prefix.is_empty() {
                action.with_prefix(self.prefix.as_str());
            }
            if let Some(token) = continuation.as_deref() {
                action.with_continuation_token(token);
            }
            let url = action.sign(SIGN_TTL);
            let body = self
                .client
                .get(url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .context("ListObjectsV2 request failed")?
                .text()
                .await
                .context("reading ListObjectsV2 body")?;
            let page = ListObjectsV2::parse_response(body.as_str())
                .context("malformed ListObjectsV2 response")?;

            out.extend(page.contents.into_iter().filter_map(|object| {
                listed_entry(
                    &self.include,
                    object.key,
                    object.size,
                    &object.last_modified,
                    listed_at,
                )
            }));

            match page.next_continuation_token {
                Some(token) if !token.is_empty() => continuation = Some(token),
                _ => break,
            }
        }
        Ok(out)
    }
}

/// Globs see the full object key, prefix included. Directory markers are skipped.
fn listed_entry(
    include: &IncludeFilter,
    key: String,
    size: u64,
    last_modified: &str,
    listed_at: SystemTime,
) -> Option<SourceEntry> {
    if key.ends_with('/') || !include.matches(&key) {
        return None;
    }
    let modified = chrono::DateTime::parse_from_rfc3339(last_modified)
        .map(SystemTime::from)
        .unwrap_or(listed_at);
    Some(SourceEntry {
        filename: file_name_of(&key),
        modified,
        size_bytes: size,
        dimensions: None,
        path: key,
    })
}

#[async_trait]
impl SourceAdapter for ObjectStorageSource {
    fn kind(&self) -> SourceKind {
        SourceKind::ObjectStorage
    }

    #[instrument(skip(self), fields(bucket = %self.bucket.name(), prefix = %self.prefix))]
    async fn list(&self) -> Result<Vec<SourceEntry>, Error> {
        let entries = self
            .list_all()
            .await
            .map_err(|err| Error::unavailable(SourceKind::ObjectStorage, format!("{err:#}")))?;
        debug!(discovered = entries.len(), "object listing complete");
        Ok(entries)
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, Error> {
        let url = self
            .bucket
            .get_object(Some(&self.credentials), key)
            .sign(SIGN_TTL);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| Error::fetch(key, err))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| Error::fetch(key, err))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globs_match_the_full_key() {
        let include = IncludeFilter::new(&["2024/**/*.jpg"]).unwrap();
        let now = SystemTime::now();
        let entry = listed_entry(
            &include,
            "2024/07/beach.jpg".into(),
            42,
            "2024-07-02T08:30:00.000Z",
            now,
        )
        .unwrap();
        assert_eq!(entry.path, "2024/07/beach.jpg");
        assert_eq!(entry.filename, "beach.jpg");
        assert_eq!(entry.size_bytes, 42);
        assert_ne!(entry.modified, now);

        assert!(listed_entry(&include, "2023/07/old.jpg".into(), 1, "", now).is_none());
    }

    #[test]
    fn directory_markers_and_bad_dates() {
        let include = IncludeFilter::new(&["**/*"]).unwrap();
        let now = SystemTime::now();
        assert!(listed_entry(&include, "2024/07/".into(), 0, "", now).is_none());
        let entry = listed_entry(&include, "a.png".into(), 1, "yesterday", now).unwrap();
        assert_eq!(entry.modified, now);
    }
}
