//! Append-only JSON-lines record of moderation outcomes.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{domain::Candidate, Result};

/// RFC3339 timestamp in UTC.
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    fn new(event: &str, user_id: Option<i64>, username: Option<&str>) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            event: event.to_string(),
            user_id,
            username: username.map(|s| s.to_string()),
            guid: None,
            title: None,
            error: None,
        }
    }

    /// `event` is `shown`, `approve`, `reject` or `skip`.
    pub fn candidate(
        event: &str,
        user_id: Option<i64>,
        username: Option<&str>,
        candidate: &Candidate,
    ) -> Self {
        Self {
            guid: Some(candidate.guid.clone()),
            title: Some(candidate.title.clone()),
            ..Self::new(event, user_id, username)
        }
    }

    pub fn failure(
        user_id: Option<i64>,
        username: Option<&str>,
        candidate: Option<&Candidate>,
        error: &str,
    ) -> Self {
        Self {
            guid: candidate.map(|c| c.guid.clone()),
            title: candidate.map(|c| c.title.clone()),
            error: Some(error.to_string()),
            ..Self::new("error", user_id, username)
        }
    }

    pub fn unauthorized(user_id: Option<i64>, username: Option<&str>) -> Self {
        Self::new("unauthorized", user_id, username)
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, event: &AuditEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}
