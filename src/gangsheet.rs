use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extractor::RejectedItem;
use crate::types::{OrderId, PackingSettings, PlacementResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GangsheetStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl GangsheetStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, GangsheetStatus::Completed | GangsheetStatus::Failed)
    }

    pub fn can_transition_to(self, next: GangsheetStatus) -> bool {
        use GangsheetStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

/// A packed batch of orders, owned by one tenant.
///
/// The settings are a snapshot taken at creation; later changes to tenant
/// defaults never alter a stored gangsheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gangsheet {
    pub id: Uuid,
    pub tenant_id: String,
    pub status: GangsheetStatus,
    pub settings: PackingSettings,
    pub group_by_modification: bool,
    pub order_ids: Vec<OrderId>,
    pub result: PlacementResult,
    pub unresolved_order_ids: Vec<OrderId>,
    pub rejected_items: Vec<RejectedItem>,
    pub file_urls: Vec<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

/// A status change applied to a stored gangsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: GangsheetStatus,
    pub file_urls: Option<Vec<String>>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn processing() -> Self {
        Self {
            status: GangsheetStatus::Processing,
            file_urls: None,
            error: None,
        }
    }

    pub fn completed(file_urls: Vec<String>) -> Self {
        Self {
            status: GangsheetStatus::Completed,
            file_urls: Some(file_urls),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: GangsheetStatus::Failed,
            file_urls: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GangsheetStatusView {
    pub id: Uuid,
    pub status: GangsheetStatus,
    pub error: Option<String>,
    pub file_urls: Vec<String>,
}

impl From<&Gangsheet> for GangsheetStatusView {
    fn from(g: &Gangsheet) -> Self {
        Self {
            id: g.id,
            status: g.status,
            error: g.error.clone(),
            file_urls: g.file_urls.clone(),
        }
    }
}
