//! Turning a decoded QR payload into a locally stored concert.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::concerts::ScannedConcertStore;
use crate::models::{Concert, ConcertRecord};
use crate::remote::{RemoteConcertLookup, RemoteError};

static CONCERT_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/concerts?/([A-Za-z0-9_-]+)").expect("valid concert path regex"));
static BARE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("valid id regex"));

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scanned code is not a concert link: {0:?}")]
    Malformed(String),
    #[error("concert lookup failed: {0}")]
    Remote(#[from] RemoteError),
}

#[derive(Debug)]
pub enum ScanOutcome {
    Loaded { record: ConcertRecord, concert: Concert },
    NotFound(String),
}

/// Pulls the concert id out of whatever the QR code held: a bare document id
/// or a link to the concert page.
pub fn parse_scan_payload(text: &str) -> Result<String, ScanError> {
    let trimmed = text.trim();
    if BARE_ID_RE.is_match(trimmed) {
        return Ok(trimmed.to_string());
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        if let Ok(url) = reqwest::Url::parse(trimmed) {
            if let Some(caps) = CONCERT_PATH_RE.captures(url.path()) {
                if let Some(id) = caps.get(1) {
                    return Ok(id.as_str().to_string());
                }
            }
            if let Some((_, id)) = url.query_pairs().find(|(name, _)| name == "id") {
                if BARE_ID_RE.is_match(&id) {
                    return Ok(id.into_owned());
                }
            }
        }
    }
    Err(ScanError::Malformed(trimmed.to_string()))
}

pub struct ScanService<R> {
    remote: R,
    scanned: ScannedConcertStore,
}

impl<R: RemoteConcertLookup> ScanService<R> {
    pub fn new(remote: R, scanned: ScannedConcertStore) -> Self {
        Self { remote, scanned }
    }

    /// Looks the scanned concert up remotely and keeps a local copy.
    /// Anything short of a found document leaves the store untouched.
    pub async fn handle_scan(&self, payload: &str) -> Result<ScanOutcome, ScanError> {
        let id = parse_scan_payload(payload)?;
        let Some(concert) = self.remote.fetch_by_id(&id).await? else {
            return Ok(ScanOutcome::NotFound(id));
        };

        let record = match self.scanned.get(&id) {
            Some(existing) => existing,
            None => {
                let record = concert.to_record(&id, Utc::now());
                self.scanned.add(record.clone());
                log::info!("stored scanned concert {id} ({})", record.title);
                record
            }
        };
        Ok(ScanOutcome::Loaded { record, concert })
    }
}
