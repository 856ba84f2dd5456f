use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::{Event, RsvpStatus, Tag};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Request error: {0}")]
    RequestError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Row shape of the `event_feed` view: one event joined with the caller's
/// RSVP and the event's audience tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_at: Option<String>,
    pub end_at: Option<String>,
    pub is_all_day: Option<bool>,
    pub my_rsvp: Option<String>,
    pub tag_ids: Option<Vec<String>>,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRow {
    pub id: Option<String>,
    pub name: Option<String>,
    pub color: Option<String>,
}

impl TryFrom<EventRow> for Event {
    type Error = BackendError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let id = row
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| BackendError::ParseError("Missing event id".to_string()))?;
        let title = row
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BackendError::ParseError(format!("Event {} has no title", id)))?;

        let start_str = row
            .start_at
            .ok_or_else(|| BackendError::ParseError(format!("Event {} has no start_at", id)))?;
        let start_at = parse_timestamp(&start_str)?;
        let end_at = match row.end_at {
            Some(end) => parse_timestamp(&end)?,
            None => start_at,
        };

        let my_rsvp = match row.my_rsvp.as_deref() {
            None => None,
            Some(raw) => Some(
                RsvpStatus::parse(raw)
                    .ok_or_else(|| BackendError::ParseError(format!("Unknown RSVP status: {}", raw)))?,
            ),
        };

        Ok(Event {
            id,
            title,
            description: row.description,
            location: row.location,
            start_at,
            end_at,
            is_all_day: row.is_all_day.unwrap_or(false),
            my_rsvp,
            audience_tags: row.tag_ids.unwrap_or_default().into_iter().collect::<BTreeSet<_>>(),
            image_path: row.image_path.filter(|p| !p.is_empty()),
        })
    }
}

impl TryFrom<TagRow> for Tag {
    type Error = BackendError;

    fn try_from(row: TagRow) -> Result<Self, Self::Error> {
        let id = row
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| BackendError::ParseError("Missing tag id".to_string()))?;
        let name = row
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| BackendError::ParseError(format!("Tag {} has no name", id)))?;

        Ok(Tag {
            id,
            name,
            color: row.color.filter(|c| !c.is_empty()),
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, BackendError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BackendError::ParseError(format!("Invalid timestamp {}: {}", value, e)))
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Events overlapping `[range_start, range_end)`.
    async fn fetch_events(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<Event>, BackendError>;

    async fn fetch_tags(&self, active_only: bool) -> Result<Vec<Tag>, BackendError>;

    async fn set_rsvp(&self, event_id: &str, status: RsvpStatus) -> Result<(), BackendError>;

    async fn add_event_tag(&self, event_id: &str, tag_id: &str) -> Result<(), BackendError>;

    async fn remove_event_tag(&self, event_id: &str, tag_id: &str) -> Result<(), BackendError>;

    async fn upload_image(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, BackendError>;

    fn image_url_from_path(&self, path: &str) -> String;

    async fn export_event_ics(&self, event_id: &str) -> Result<Vec<u8>, BackendError>;
}

pub struct RestClient {
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
    image_bucket: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct RsvpPayload<'a> {
    p_event_id: &'a str,
    p_status: &'a str,
}

#[derive(Debug, Serialize)]
struct EventTagPayload<'a> {
    event_id: &'a str,
    tag_id: &'a str,
}

impl RestClient {
    pub fn new(base_url: String, anon_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            access_token: None,
            image_bucket: "event-images".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_access_token(mut self, access_token: Option<String>) -> Self {
        self.access_token = access_token;
        self
    }

    pub fn with_image_bucket(mut self, bucket: String) -> Self {
        self.image_bucket = bucket;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn ensure_success(
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        tracing::info!("{} response status: {}", what, status);

        if status == 401 || status == 403 {
            tracing::error!("Authentication failed for {}", what);
            return Err(BackendError::AuthenticationFailed);
        }

        if status == 404 {
            tracing::error!("{} target not found", what);
            return Err(BackendError::NotFound(what.to_string()));
        }

        if status == 429 {
            tracing::warn!("Rate limit exceeded");
            return Err(BackendError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await?;
            tracing::error!("{} failed. Status: {}, Body: {}", what, status, body);
            return Err(BackendError::RequestError(format!("Status {}: {}", status, body)));
        }

        Ok(response)
    }

    fn object_path(&self, path: &str) -> String {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match extension.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "image/jpeg",
    }
}

#[async_trait]
impl BackendApi for RestClient {
    async fn fetch_events(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<Event>, BackendError> {
        tracing::info!("Fetching events from {} to {}", range_start, range_end);

        let response = self
            .request(reqwest::Method::GET, "/rest/v1/event_feed")
            .query(&[
                ("select", "*".to_string()),
                ("start_at", format!("lt.{}", range_end.to_rfc3339())),
                ("end_at", format!("gte.{}", range_start.to_rfc3339())),
                ("order", "start_at.asc".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<EventRow> = Self::ensure_success(response, "fetch events").await?.json().await?;

        let events: Vec<Event> = rows
            .into_iter()
            .filter_map(|row| match Event::try_from(row) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!("Skipping event row: {}", e);
                    None
                }
            })
            .collect();

        tracing::info!("Fetched {} events successfully", events.len());
        Ok(events)
    }

    async fn fetch_tags(&self, active_only: bool) -> Result<Vec<Tag>, BackendError> {
        let mut query = vec![("select", "id,name,color"), ("order", "name.asc")];
        if active_only {
            query.push(("is_active", "eq.true"));
        }

        let response = self
            .request(reqwest::Method::GET, "/rest/v1/tags")
            .query(&query)
            .send()
            .await?;

        let rows: Vec<TagRow> = Self::ensure_success(response, "fetch tags").await?.json().await?;

        let tags: Vec<Tag> = rows
            .into_iter()
            .filter_map(|row| match Tag::try_from(row) {
                Ok(tag) => Some(tag),
                Err(e) => {
                    tracing::warn!("Skipping tag row: {}", e);
                    None
                }
            })
            .collect();

        tracing::info!("Fetched {} tags", tags.len());
        Ok(tags)
    }

    async fn set_rsvp(&self, event_id: &str, status: RsvpStatus) -> Result<(), BackendError> {
        tracing::info!("Setting RSVP for {} to {}", event_id, status);

        let response = self
            .request(reqwest::Method::POST, "/rest/v1/rpc/set_rsvp")
            .json(&RsvpPayload {
                p_event_id: event_id,
                p_status: status.as_str(),
            })
            .send()
            .await?;

        Self::ensure_success(response, "set rsvp").await?;
        Ok(())
    }

    async fn add_event_tag(&self, event_id: &str, tag_id: &str) -> Result<(), BackendError> {
        tracing::debug!("Adding tag {} to event {}", tag_id, event_id);

        let response = self
            .request(reqwest::Method::POST, "/rest/v1/event_tags")
            .header("Prefer", "resolution=ignore-duplicates")
            .json(&EventTagPayload { event_id, tag_id })
            .send()
            .await?;

        Self::ensure_success(response, "add event tag").await?;
        Ok(())
    }

    async fn remove_event_tag(&self, event_id: &str, tag_id: &str) -> Result<(), BackendError> {
        tracing::debug!("Removing tag {} from event {}", tag_id, event_id);

        let response = self
            .request(reqwest::Method::DELETE, "/rest/v1/event_tags")
            .query(&[
                ("event_id", format!("eq.{}", event_id)),
                ("tag_id", format!("eq.{}", tag_id)),
            ])
            .send()
            .await?;

        Self::ensure_success(response, "remove event tag").await?;
        Ok(())
    }

    async fn upload_image(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, BackendError> {
        let stored_path = format!("events/{}-{}", uuid::Uuid::new_v4(), file_name);
        let url_path = format!(
            "/storage/v1/object/{}/{}",
            self.image_bucket,
            self.object_path(&stored_path)
        );

        tracing::info!("Uploading {} bytes to {}", bytes.len(), stored_path);

        let response = self
            .request(reqwest::Method::POST, &url_path)
            .header("Content-Type", content_type_for(file_name))
            .body(bytes)
            .send()
            .await?;

        Self::ensure_success(response, "upload image").await?;
        Ok(stored_path)
    }

    fn image_url_from_path(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.image_bucket,
            self.object_path(path)
        )
    }

    async fn export_event_ics(&self, event_id: &str) -> Result<Vec<u8>, BackendError> {
        tracing::info!("Exporting event {} as ICS", event_id);

        let response = self
            .request(reqwest::Method::GET, "/functions/v1/event-ics")
            .query(&[("event_id", event_id)])
            .send()
            .await?;

        let body = Self::ensure_success(response, "export event").await?.bytes().await?;
        Ok(body.to_vec())
    }
}
