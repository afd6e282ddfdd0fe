//! WebDAV source: breadth-first `PROPFIND Depth: 1` walk plus plain `GET`.

use std::collections::{HashSet, VecDeque};
use std::time::SystemTime;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use super::{IncludeFilter, SourceAdapter, SourceEntry, file_name_of};
use crate::config::WebdavSourceConfig;
use crate::error::Error;
use crate::media::SourceKind;

const SAFE_PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop><d:resourcetype/><d:getcontentlength/><d:getlastmodified/></d:prop>
</d:propfind>"#;

pub struct WebdavSource {
    client: Client,
    propfind: Method,
    base: Url,
    /// Decoded absolute path of the collection the walk starts from.
    root: String,
    username: String,
    password: String,
    include: IncludeFilter,
}

impl WebdavSource {
    pub fn new(cfg: &WebdavSourceConfig, include: IncludeFilter, client: Client) -> Result<Self> {
        let raw = cfg.url.as_deref().context("webdav source requires `url`")?;
        let base = Url::parse(raw).with_context(|| format!("invalid webdav url {raw:?}"))?;
        let base_path = decode_path(base.path());
        let root = join_paths(&base_path, &cfg.root);
        Ok(Self {
            client,
            propfind: Method::from_bytes(b"PROPFIND").context("PROPFIND method")?,
            base,
            root,
            username: cfg.username.clone().unwrap_or_default(),
            password: cfg.password.clone().unwrap_or_default(),
            include,
        })
    }

    fn url_for(&self, decoded_path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(&encode_path(decoded_path));
        url.set_query(None);
        url
    }

    async fn propfind(&self, collection: &str) -> Result<Vec<DavEntry>> {
        let url = self.url_for(&with_trailing_slash(collection));
        let response = self
            .client
            .request(self.propfind.clone(), url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header("Depth", "1")
            .header(reqwest::header::CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(PROPFIND_BODY)
            .send()
            .await
            .with_context(|| format!("PROPFIND {url}"))?;
        let status = response.status();
        if status != StatusCode::MULTI_STATUS && !status.is_success() {
            return Err(anyhow!("PROPFIND {url} returned {status}"));
        }
        let body = response.text().await.context("reading PROPFIND body")?;
        parse_multistatus(&body)
    }

    async fn walk(&self) -> Result<Vec<SourceEntry>> {
        let listed_at = SystemTime::now();
        let mut queue = VecDeque::from([self.root.clone()]);
        let mut visited = HashSet::new();
        let mut out = Vec::new();

        while let Some(collection) = queue.pop_front() {
            let key = collection.trim_end_matches('/').to_owned();
            if !visited.insert(key.clone()) {
                continue;
            }
            for entry in self.propfind(&collection).await? {
                let path = href_path(&entry.href);
                if path.trim_end_matches('/') == key {
                    continue;
                }
                if entry.is_collection {
                    queue.push_back(path);
                    continue;
                }
                let relative = path
                    .strip_prefix(self.root.trim_end_matches('/'))
                    .unwrap_or(&path);
                if !self.include.matches(relative) {
                    continue;
                }
                out.push(SourceEntry {
                    filename: file_name_of(&path),
                    modified: entry.modified.unwrap_or(listed_at),
                    size_bytes: entry.size.unwrap_or(0),
                    dimensions: None,
                    path,
                });
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for WebdavSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Webdav
    }

    #[instrument(skip(self), fields(root = %self.root))]
    async fn list(&self) -> Result<Vec<SourceEntry>, Error> {
        let entries = self
            .walk()
            .await
            .map_err(|err| Error::unavailable(SourceKind::Webdav, format!("{err:#}")))?;
        debug!(discovered = entries.len(), "webdav listing complete");
        Ok(entries)
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, Error> {
        let url = self.url_for(path);
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| Error::fetch(path, err))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| Error::fetch(path, err))?;
        Ok(bytes.to_vec())
    }
}

/// One `<response>` element of a multistatus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavEntry {
    pub href: String,
    pub is_collection: bool,
    pub size: Option<u64>,
    pub modified: Option<SystemTime>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Href,
    Length,
    Modified,
}

/// Parse a `207 Multi-Status` PROPFIND body, ignoring namespace prefixes.
pub fn parse_multistatus(xml: &str) -> Result<Vec<DavEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<DavEntry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event().context("malformed multistatus XML")? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"response" => {
                    current = Some(DavEntry {
                        href: String::new(),
                        is_collection: false,
                        size: None,
                        modified: None,
                    });
                }
                b"href" => field = Some(Field::Href),
                b"getcontentlength" => field = Some(Field::Length),
                b"getlastmodified" => field = Some(Field::Modified),
                b"collection" => {
                    if let Some(entry) = current.as_mut() {
                        entry.is_collection = true;
                    }
                }
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"collection"
                    && let Some(entry) = current.as_mut()
                {
                    entry.is_collection = true;
                }
            }
            Event::Text(t) => {
                if field.is_some() {
                    text.push_str(&t.decode().context("non-UTF-8 text in multistatus")?);
                }
            }
            Event::GeneralRef(r) => {
                if field.is_some() {
                    let name = r.decode().context("non-UTF-8 entity in multistatus")?;
                    if let Some(resolved) = resolve_predefined_entity(&name) {
                        text.push_str(resolved);
                    } else if let Some(ch) = r.resolve_char_ref().ok().flatten() {
                        text.push(ch);
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"response" => {
                    if let Some(entry) = current.take()
                        && !entry.href.is_empty()
                    {
                        entries.push(entry);
                    }
                }
                b"href" | b"getcontentlength" | b"getlastmodified" => {
                    if let (Some(f), Some(entry)) = (field.take(), current.as_mut()) {
                        let value = std::mem::take(&mut text);
                        let value = value.trim();
                        match f {
                            Field::Href => entry.href = value.to_owned(),
                            Field::Length => entry.size = value.parse().ok(),
                            Field::Modified => {
                                entry.modified = chrono::DateTime::parse_from_rfc2822(value)
                                    .ok()
                                    .map(SystemTime::from);
                            }
                        }
                    }
                    text.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}

/// Decoded path component of an href, which may be absolute or path-only.
fn href_path(href: &str) -> String {
    let raw = match Url::parse(href) {
        Ok(url) => url.path().to_owned(),
        Err(_) => href.split(['?', '#']).next().unwrap_or(href).to_owned(),
    };
    decode_path(&raw)
}

fn decode_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

fn encode_path(decoded: &str) -> String {
    decoded
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SAFE_PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn join_paths(base: &str, root: &str) -> String {
    let base = base.trim_end_matches('/');
    let root = root.trim_matches('/');
    if root.is_empty() {
        format!("{base}/")
    } else {
        format!("{base}/{root}/")
    }
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_owned()
    } else {
        format!("{path}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/dav/Photos/</d:href>
    <d:propstat><d:prop>
      <d:resourcetype><d:collection/></d:resourcetype>
    </d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/Photos/Summer%202024/</d:href>
    <d:propstat><d:prop>
      <d:resourcetype><d:collection/></d:resourcetype>
      <d:getlastmodified>Mon, 01 Jul 2024 10:00:00 GMT</d:getlastmodified>
    </d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/Photos/Tom%20&amp;%20Jerry.JPG</d:href>
    <d:propstat><d:prop>
      <d:resourcetype/>
      <d:getcontentlength>12345</d:getcontentlength>
      <d:getlastmodified>Tue, 02 Jul 2024 08:30:00 GMT</d:getlastmodified>
    </d:prop></d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn parses_collections_and_files() {
        let entries = parse_multistatus(SAMPLE).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_collection);
        assert!(entries[1].is_collection);

        let file = &entries[2];
        assert!(!file.is_collection);
        assert_eq!(file.href, "/dav/Photos/Tom%20&%20Jerry.JPG");
        assert_eq!(file.size, Some(12345));
        let expected = chrono::DateTime::parse_from_rfc2822("Tue, 02 Jul 2024 08:30:00 GMT")
            .map(SystemTime::from)
            .unwrap();
        assert_eq!(file.modified, Some(expected));
    }

    #[test]
    fn missing_properties_stay_unset() {
        let xml = r#"<multistatus xmlns="DAV:"><response><href>/a.png</href></response></multistatus>"#;
        let entries = parse_multistatus(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, None);
        assert_eq!(entries[0].modified, None);
    }

    #[test]
    fn href_paths_are_decoded_and_reencoded_per_segment() {
        assert_eq!(
            href_path("https://dav.example.com/dav/Summer%202024/a.jpg"),
            "/dav/Summer 2024/a.jpg"
        );
        assert_eq!(href_path("/dav/x%23y.jpg"), "/dav/x#y.jpg");
        assert_eq!(encode_path("/dav/x#y z.jpg"), "/dav/x%23y%20z.jpg");
    }

    #[test]
    fn root_is_joined_below_base_path() {
        assert_eq!(join_paths("/remote.php/dav/", "/Photos"), "/remote.php/dav/Photos/");
        assert_eq!(join_paths("/", "/"), "/");
    }
}
