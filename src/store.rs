use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::config::{StoreConfig, StoreCredentials};
use crate::error::StoreError;
use crate::models::{FunnelEvent, Person};

const USER_AGENT: &str = concat!("funnel-dashboard/", env!("CARGO_PKG_VERSION"));

pub const FIELD_NAME: &str = "Name";
pub const FIELD_STATUS: &str = "Status";
pub const FIELD_CLOSURE: &str = "Closure Classification";
pub const FIELD_CREATED: &str = "Created";
pub const FIELD_FROM_STATUS: &str = "From Status";
pub const FIELD_TO_STATUS: &str = "To Status";
pub const FIELD_TIMESTAMP: &str = "Timestamp";
pub const FIELD_PERSON: &str = "Person";

/// Read/update access to the two collections the dashboard is built from.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_people(&self) -> Result<Vec<Person>, StoreError>;

    /// Events come back ordered by timestamp, oldest first.
    async fn fetch_funnel_events(&self) -> Result<Vec<FunnelEvent>, StoreError>;

    async fn update_field(
        &self,
        person_id: &str,
        field: &str,
        value: Value,
    ) -> Result<Person, StoreError>;
}

#[derive(Debug, Deserialize)]
struct RecordPage {
    records: Vec<RawRecord>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    id: String,
    #[serde(rename = "createdTime")]
    created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Airtable REST client. Every call is a live passthrough; nothing is cached.
pub struct AirtableClient {
    http_client: reqwest::Client,
    config: StoreConfig,
}

impl AirtableClient {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    fn table_url(
        creds: &StoreCredentials<'_>,
        table: &str,
        record_id: Option<&str>,
    ) -> Result<Url, StoreError> {
        let mut url = Url::parse(creds.api_url)
            .map_err(|e| StoreError::Config(format!("invalid AIRTABLE_API_URL: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::Config("AIRTABLE_API_URL cannot be a base".into()))?;
            segments.pop_if_empty().push(creds.base_id).push(table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn list_records(
        &self,
        creds: &StoreCredentials<'_>,
        table: &str,
        sort_field: Option<&str>,
    ) -> Result<Vec<RawRecord>, StoreError> {
        let url = Self::table_url(creds, table, None)?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let request = {
                let mut params: Vec<(&str, &str)> = Vec::new();
                if let Some(field) = sort_field {
                    params.push(("sort[0][field]", field));
                    params.push(("sort[0][direction]", "asc"));
                }
                if let Some(offset) = offset.as_deref() {
                    params.push(("offset", offset));
                }

                self.http_client
                    .request(Method::GET, url.clone())
                    .bearer_auth(creds.api_key)
                    .query(&params)
            };
            let page: RecordPage = send(request, table).await?;

            debug!(table, fetched = page.records.len(), "Fetched record page");
            records.extend(page.records);

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl RecordSource for AirtableClient {
    async fn fetch_people(&self) -> Result<Vec<Person>, StoreError> {
        let creds = self.config.require()?;
        let records = self.list_records(&creds, creds.people_table, None).await?;
        let people = records
            .into_iter()
            .map(decode_person)
            .collect::<Result<Vec<_>, _>>()?;

        info!(count = people.len(), "Fetched people");
        Ok(people)
    }

    async fn fetch_funnel_events(&self) -> Result<Vec<FunnelEvent>, StoreError> {
        let creds = self.config.require()?;
        let records = self
            .list_records(&creds, creds.events_table, Some(FIELD_TIMESTAMP))
            .await?;
        let mut events = records
            .into_iter()
            .map(decode_event)
            .collect::<Result<Vec<_>, _>>()?;
        events.sort_by_key(|event| event.timestamp);

        info!(count = events.len(), "Fetched funnel events");
        Ok(events)
    }

    async fn update_field(
        &self,
        person_id: &str,
        field: &str,
        value: Value,
    ) -> Result<Person, StoreError> {
        let creds = self.config.require()?;
        let url = Self::table_url(&creds, creds.people_table, Some(person_id))?;

        let mut fields = Map::new();
        fields.insert(field.to_string(), value);

        let request = self
            .http_client
            .request(Method::PATCH, url)
            .bearer_auth(creds.api_key)
            .json(&json!({ "fields": fields }));
        let record: RawRecord = send(request, person_id).await?;

        info!(person_id, field, "Updated person field");
        decode_person(record)
    }
}

async fn send<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    target: &str,
) -> Result<T, StoreError> {
    let response = request
        .send()
        .await
        .map_err(|e| StoreError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = upstream_message(&body);
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                target: target.to_string(),
                message,
            });
        }
        return Err(StoreError::Upstream {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json()
        .await
        .map_err(|e| StoreError::Decode(e.to_string()))
}

/// Airtable reports errors either as `{"error": "CODE"}` or as
/// `{"error": {"type": ..., "message": ...}}`.
fn upstream_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|value| value.get("error"));
    match error {
        Some(Value::String(code)) => code.clone(),
        Some(Value::Object(detail)) => detail
            .get("message")
            .or_else(|| detail.get("type"))
            .and_then(Value::as_str)
            .unwrap_or(body)
            .to_string(),
        _ => body.trim().to_string(),
    }
}

fn decode_person(record: RawRecord) -> Result<Person, StoreError> {
    let RawRecord {
        id,
        created_time,
        mut fields,
    } = record;

    let created = fields
        .get(FIELD_CREATED)
        .and_then(timestamp)
        .or(created_time)
        .ok_or_else(|| StoreError::Decode(format!("person {id} has no creation time")))?;

    let name = fields.remove(FIELD_NAME).as_ref().and_then(text).unwrap_or_default();
    let status = fields.remove(FIELD_STATUS).as_ref().and_then(text);
    let closure_classification = fields.remove(FIELD_CLOSURE).as_ref().and_then(text);
    fields.remove(FIELD_CREATED);

    Ok(Person {
        id,
        name,
        status,
        closure_classification,
        created,
        extra: fields,
    })
}

fn decode_event(record: RawRecord) -> Result<FunnelEvent, StoreError> {
    let RawRecord {
        id,
        created_time,
        fields,
    } = record;

    let timestamp = fields
        .get(FIELD_TIMESTAMP)
        .and_then(timestamp)
        .or(created_time)
        .ok_or_else(|| StoreError::Decode(format!("funnel event {id} has no timestamp")))?;

    Ok(FunnelEvent {
        from_status: fields.get(FIELD_FROM_STATUS).and_then(text),
        to_status: fields.get(FIELD_TO_STATUS).and_then(text),
        person_id: fields.get(FIELD_PERSON).and_then(text),
        timestamp,
        id,
    })
}

/// Scalar text from a field. Lookup and link fields arrive as arrays, so the
/// first element stands in for the value.
fn text(value: &Value) -> Option<String> {
    let scalar = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => return items.first().and_then(text),
        Value::Object(map) => return map.get("name").and_then(text),
        Value::Null => return None,
    };
    (!scalar.is_empty()).then_some(scalar)
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = text(value)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
