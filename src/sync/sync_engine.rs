use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use regex::Regex;
use thiserror::Error;

use crate::calendar::{Event, RsvpStatus, Tag, days};
use crate::storage::config::{Config, SyncConfig};
use crate::sync::backend::{BackendApi, BackendError, RestClient};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Backend error: {0}")]
    BackendError(#[from] BackendError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub fn validate_id(kind: &str, id: &str) -> Result<(), SyncError> {
    static ID_RE: OnceLock<Regex> = OnceLock::new();
    let regex = ID_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,127}$").expect("invalid identifier regex")
    });

    if regex.is_match(id) {
        Ok(())
    } else {
        Err(SyncError::InvalidInput(format!("malformed {} id: {:?}", kind, id)))
    }
}

/// Tags to add and tags to remove to turn `previous` into `desired`.
pub fn diff_tags(
    previous: &BTreeSet<String>,
    desired: &BTreeSet<String>,
) -> (Vec<String>, Vec<String>) {
    let to_add = desired.difference(previous).cloned().collect();
    let to_remove = previous.difference(desired).cloned().collect();
    (to_add, to_remove)
}

pub struct SyncEngine<A> {
    config: SyncConfig,
    api: A,
    fallback_tags: Vec<Tag>,
}

impl SyncEngine<RestClient> {
    pub fn from_config(config: &Config) -> Self {
        let client = RestClient::new(config.backend.url.clone(), config.backend.anon_key.clone())
            .with_access_token(config.backend.access_token.clone())
            .with_image_bucket(config.backend.image_bucket.clone());
        Self::new(config.sync.clone(), client)
    }
}

impl<A: BackendApi> SyncEngine<A> {
    pub fn new(config: SyncConfig, api: A) -> Self {
        Self {
            config,
            api,
            fallback_tags: Vec::new(),
        }
    }

    /// Tags served by [`Self::fetch_tags_or_fallback`] when the backend is unreachable.
    pub fn with_fallback_tags(mut self, tags: Vec<Tag>) -> Self {
        self.fallback_tags = tags;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn fetch_events(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<Event>, SyncError> {
        if range_start > range_end {
            return Err(SyncError::InvalidInput(format!(
                "range start {} is after range end {}",
                range_start, range_end
            )));
        }
        Ok(self.api.fetch_events(range_start, range_end).await?)
    }

    pub async fn fetch_events_around(&self, center_date: NaiveDate) -> Result<Vec<Event>, SyncError> {
        let start_date = center_date
            .checked_sub_days(Days::new(self.config.past_days as u64))
            .unwrap_or(center_date);

        let end_date = center_date
            .checked_add_days(Days::new(self.config.future_days as u64 + 1))
            .unwrap_or(center_date);

        self.fetch_events(days::start_of_day(start_date, &Local), days::start_of_day(end_date, &Local))
            .await
    }

    pub async fn fetch_tags(&self, active_only: bool) -> Result<Vec<Tag>, SyncError> {
        Ok(self.api.fetch_tags(active_only).await?)
    }

    pub async fn fetch_tags_or_fallback(&self, active_only: bool) -> Vec<Tag> {
        match self.api.fetch_tags(active_only).await {
            Ok(tags) => tags,
            Err(e) => {
                tracing::warn!("Fetching tags failed, using {} fallback tags: {}", self.fallback_tags.len(), e);
                self.fallback_tags.clone()
            }
        }
    }

    pub async fn set_rsvp(&self, event_id: &str, status: RsvpStatus) -> Result<(), SyncError> {
        validate_id("event", event_id)?;
        Ok(self.api.set_rsvp(event_id, status).await?)
    }

    /// Replaces the event's tag membership with `desired`, issuing only the
    /// additions and removals that differ from `previous`.
    pub async fn set_event_tags(
        &self,
        event_id: &str,
        previous: &BTreeSet<String>,
        desired: &BTreeSet<String>,
    ) -> Result<(), SyncError> {
        validate_id("event", event_id)?;
        for tag_id in desired {
            validate_id("tag", tag_id)?;
        }

        let (to_add, to_remove) = diff_tags(previous, desired);
        tracing::info!(
            "Updating tags for {}: +{} -{}",
            event_id,
            to_add.len(),
            to_remove.len()
        );

        for tag_id in &to_add {
            self.api.add_event_tag(event_id, tag_id).await?;
        }
        for tag_id in &to_remove {
            self.api.remove_event_tag(event_id, tag_id).await?;
        }
        Ok(())
    }

    pub async fn upload_image(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, SyncError> {
        if bytes.is_empty() {
            return Err(SyncError::InvalidInput("image is empty".to_string()));
        }
        let file_name = sanitize_file_name(file_name);
        Ok(self.api.upload_image(bytes, &file_name).await?)
    }

    pub fn image_url(&self, path: &str) -> String {
        self.api.image_url_from_path(path)
    }

    pub async fn export_event_ics(&self, event_id: &str) -> Result<Vec<u8>, SyncError> {
        validate_id("event", event_id)?;
        Ok(self.api.export_event_ics(event_id).await?)
    }
}

fn sanitize_file_name(name: &str) -> String {
    static UNSAFE_RE: OnceLock<Regex> = OnceLock::new();
    let regex = UNSAFE_RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("invalid file name regex"));

    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = regex.replace_all(base, "_").trim_matches('_').to_string();
    if cleaned.is_empty() || cleaned.starts_with('.') {
        format!("image{}", cleaned)
    } else {
        cleaned
    }
}
