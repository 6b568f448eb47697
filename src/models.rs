use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ReportError, ReportResult};

/// One contiguous period an entity was online.
///
/// `end < start` is tolerated and contributes nothing to a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub entity_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Session {
    pub fn new(entity_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            entity_id,
            start,
            end,
        }
    }
}

/// Reporting period `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> ReportResult<Self> {
        let window = Self { begin, end };
        window.validate()?;
        Ok(window)
    }

    /// Windows can arrive deserialized, so the pipeline re-checks this.
    pub fn validate(&self) -> ReportResult<()> {
        if self.begin > self.end {
            return Err(ReportError::InvalidWindow {
                begin: self.begin.to_rfc3339(),
                end: self.end.to_rfc3339(),
            });
        }
        Ok(())
    }

    pub fn length(&self) -> Duration {
        self.end - self.begin
    }
}

/// Total activity of one entity inside a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub entity_id: Uuid,
    pub label: String,
    #[serde(with = "seconds", rename = "total_active_secs")]
    pub total_active: Duration,
}

impl AggregatedResult {
    pub fn total_active_seconds(&self) -> i64 {
        self.total_active.num_seconds()
    }
}

/// A 1-indexed slice of an ordered sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub index: usize,
    pub page_size: usize,
    pub items: Vec<T>,
    pub total_pages: usize,
    pub total_items: usize,
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_previous(&self) -> bool {
        self.index > 1
    }

    pub fn has_next(&self) -> bool {
        self.index < self.total_pages
    }

    /// Absolute 1-based rank of the first item on this page.
    pub fn first_rank(&self) -> usize {
        self.index.saturating_sub(1) * self.page_size + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Report policy. Every field has its own default so partial configs work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    pub page_size: usize,
    #[serde(with = "seconds", rename = "min_active_secs")]
    pub min_active: Duration,
    pub show_inactive: bool,
    pub order: SortOrder,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            page_size: 10,
            min_active: Duration::seconds(60),
            show_inactive: false,
            order: SortOrder::Ascending,
        }
    }
}

/// Durations travel as whole seconds.
pub(crate) mod seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Ok(Duration::seconds(secs))
    }
}

/// API Response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EntityInput {
    pub entity_id: Option<Uuid>,
    pub label: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupInput {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MemberInput {
    pub entity_id: Uuid,
}

/// Who a report covers: a named group (guild) or an explicit entity list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportTarget {
    Group(String),
    Entities(Vec<Uuid>),
}

#[derive(Debug, Deserialize)]
pub struct ActivityReportRequest {
    pub target: ReportTarget,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "first_page")]
    pub page: usize,
    pub options: Option<ReportOptions>,
}

fn first_page() -> usize {
    1
}

/// One rendered table row.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReportRow {
    pub rank: usize,
    pub entity_id: Uuid,
    pub label: String,
    pub active_secs: i64,
    pub activity: String,
}
