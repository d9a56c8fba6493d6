use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// GET /api/v4/registry/repositories/:id and the project/group listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub project_id: u64,
    pub name: String,
    pub path: String,
    pub location: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags_count: Option<u64>,
}

/// Entry of GET .../registry/repositories/:id/tags. Carries no timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CondensedTag {
    pub name: String,
    pub path: String,
    pub location: String,
}

/// GET .../registry/repositories/:id/tags/:name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedTag {
    pub name: String,
    pub path: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total_size: u64,
}

impl DetailedTag {
    /// Stand-in used when no tag details could be fetched at all.
    pub fn placeholder(tag: CondensedTag, now: DateTime<Utc>) -> Self {
        Self {
            name: tag.name,
            path: tag.path,
            location: tag.location,
            created_at: now,
            digest: None,
            total_size: 0,
        }
    }
}

/// Result of applying the retention policy to a repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupPlan {
    pub repository: Repository,
    pub to_delete: Vec<DetailedTag>,
    pub kept: usize,
    #[serde(default)]
    pub degraded: bool,
}
