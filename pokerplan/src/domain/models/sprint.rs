use serde::{Deserialize, Serialize};

use super::{project::string_enum, ProjectId, SprintId};

string_enum! {
    /// Lifecycle state of a sprint.
    pub enum SprintStatus {
        Planning => "planning",
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

/// A sprint as stored in the `sprints` collection.
///
/// Only the fields this crate aggregates over are modelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sprint {
    pub id: SprintId,
    pub project_id: ProjectId,
    pub status: SprintStatus,
}
