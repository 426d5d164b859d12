use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GraphStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

/// Counts reported by a graph's engine instance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphStats {
    pub entity_count: u64,
    pub relation_count: u64,
    pub document_count: u64,
}

/// Persisted metadata of one named graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphRecord {
    pub graph_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub working_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status: GraphStatus,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub entity_count: u64,
    #[serde(default)]
    pub relation_count: u64,
    #[serde(default)]
    pub document_count: u64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl GraphRecord {
    pub fn new(
        graph_id: String,
        name: String,
        description: String,
        working_dir: PathBuf,
        metadata: Map<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            graph_id,
            name,
            description,
            working_dir,
            created_at: now,
            updated_at: now,
            status: GraphStatus::Active,
            is_active: false,
            entity_count: 0,
            relation_count: 0,
            document_count: 0,
            metadata,
        }
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            entity_count: self.entity_count,
            relation_count: self.relation_count,
            document_count: self.document_count,
        }
    }

    pub fn apply_stats(&mut self, stats: GraphStats) {
        self.entity_count = stats.entity_count;
        self.relation_count = stats.relation_count;
        self.document_count = stats.document_count;
    }
}

/// Partial update of the mutable record fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<GraphStatus>,
    pub metadata: Option<Map<String, Value>>,
}

/// Trim and bound-check a display name.
pub fn validate_name(name: &str) -> Result<String, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Graph name must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "Graph name must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_description(description: &str) -> Result<(), AppError> {
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(AppError::Validation(format!(
            "Graph description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(())
}
