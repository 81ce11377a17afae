//! Read-only access to published concert documents over the Firestore REST API.

use chrono::DateTime;
use chrono_tz::Tz;
use reqwest::{Client, StatusCode, Url};
use serde_json::{Map, Value};

use crate::config::AppConfig;
use crate::models::Concert;
use crate::remote::{RemoteConcertLookup, RemoteError};

const BASE_URL: &str = "https://firestore.googleapis.com/v1";
const USER_AGENT: &str = "concert-program/0.1";

pub struct FirestoreClient {
    client: Client,
    documents_url: String,
    api_key: Option<String>,
    tz: Tz,
}

impl FirestoreClient {
    pub fn from_config(config: &AppConfig) -> Result<Self, RemoteError> {
        let project = config
            .firestore_project_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| RemoteError::NotConfigured("firestore project id".into()))?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| RemoteError::Http(err.to_string()))?;

        Ok(Self {
            client,
            documents_url: format!(
                "{BASE_URL}/projects/{project}/databases/(default)/documents/{}",
                config.collection.trim_matches('/')
            ),
            api_key: config.firestore_api_key.clone(),
            tz: config.tz(),
        })
    }

    fn document_url(&self, id: &str, mask: Option<&str>) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.documents_url)
            .map_err(|err| RemoteError::Http(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::Http("documents url cannot be a base".into()))?
            .push(id);
        {
            let mut query = url.query_pairs_mut();
            if let Some(field) = mask {
                query.append_pair("mask.fieldPaths", field);
            }
            if let Some(key) = &self.api_key {
                query.append_pair("key", key);
            }
        }
        Ok(url)
    }

    /// `None` when the document does not exist.
    async fn get_document(&self, url: Url) -> Result<Option<Value>, RemoteError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| RemoteError::Http(err.to_string()))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = response
            .text()
            .await
            .map_err(|err| RemoteError::Http(err.to_string()))?;
        if !status.is_success() {
            return Err(RemoteError::Http(format!("status {}: {}", status, text)));
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|err| RemoteError::Parse(err.to_string()))
    }
}

impl RemoteConcertLookup for FirestoreClient {
    async fn fetch_by_id(&self, id: &str) -> Result<Option<Concert>, RemoteError> {
        if id.trim().is_empty() {
            return Ok(None);
        }
        let url = self.document_url(id, None)?;
        match self.get_document(url).await? {
            Some(document) => decode_concert(&document, self.tz).map(Some),
            None => {
                log::info!("no concert found with id {id}");
                Ok(None)
            }
        }
    }

    async fn exists(&self, id: &str) -> Result<bool, RemoteError> {
        if id.trim().is_empty() {
            return Ok(false);
        }
        let url = self.document_url(id, Some("title"))?;
        Ok(self.get_document(url).await?.is_some())
    }
}

/// Flattens a Firestore document's typed `fields` and reads it as a [`Concert`].
pub fn decode_concert(document: &Value, tz: Tz) -> Result<Concert, RemoteError> {
    let fields = document
        .get("fields")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let mut plain = decode_fields(&fields);

    // timestamps are shown in local wall-clock form
    let local_date = plain
        .get("date")
        .and_then(Value::as_str)
        .and_then(|date| DateTime::parse_from_rfc3339(date).ok())
        .map(|dt| dt.with_timezone(&tz).format("%-m/%-d/%Y %-I:%M%P").to_string());
    if let Some(local) = local_date {
        plain.insert("date".into(), Value::String(local));
    }

    serde_json::from_value(Value::Object(plain)).map_err(|err| RemoteError::Parse(err.to_string()))
}

fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), decode_value(value)))
        .collect()
}

fn decode_value(value: &Value) -> Value {
    let Some(typed) = value.as_object() else {
        return Value::Null;
    };
    if let Some(s) = typed.get("stringValue") {
        return s.clone();
    }
    if let Some(ts) = typed.get("timestampValue") {
        return ts.clone();
    }
    if let Some(b) = typed.get("booleanValue") {
        return b.clone();
    }
    if let Some(i) = typed.get("integerValue") {
        // int64 travels as a JSON string
        return i
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| i.clone());
    }
    if let Some(d) = typed.get("doubleValue") {
        return d.clone();
    }
    if let Some(array) = typed.get("arrayValue") {
        let values = array
            .get("values")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(decode_value).collect())
            .unwrap_or_default();
        return Value::Array(values);
    }
    if let Some(map) = typed.get("mapValue") {
        let inner = map
            .get("fields")
            .and_then(Value::as_object)
            .map(decode_fields)
            .unwrap_or_default();
        return Value::Object(inner);
    }
    if let Some(reference) = typed.get("referenceValue") {
        return reference.clone();
    }
    Value::Null
}
