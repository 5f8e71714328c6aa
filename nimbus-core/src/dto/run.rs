//! Run submission DTOs

use serde::{Deserialize, Serialize};

use crate::domain::project::NotificationEmailKind;

/// Body for submitting a run against the previously pushed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRunRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub app_file_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_file_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_file_id: Option<u64>,
}

/// Response to an artifact upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUpload {
    pub id: u64,
}

/// Email side-table update for the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub email: String,
    pub kind: NotificationEmailKind,
}
