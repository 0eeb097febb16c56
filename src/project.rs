use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    User,
    Group,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Namespace {
    pub id: u64,
    pub kind: NamespaceKind,
    pub full_path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Statistics {
    pub repository_size: ByteSize,
}

/// A project as returned by `GET /api/v4/projects`, trimmed down to the
/// fields the dumper needs. Fetched once per run and never mutated.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Project {
    pub id: u64,
    /// Leaf slug, e.g. `service` for `team/backend/service`.
    pub path: String,
    pub path_with_namespace: String,
    pub namespace: Namespace,
    #[serde(default)]
    pub empty_repo: bool,
    pub default_branch: Option<String>,
    pub web_url: String,
    pub ssh_url_to_repo: String,
    /// Only present when the listing was requested with statistics.
    #[serde(default)]
    pub statistics: Option<Statistics>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Group {
    pub id: u64,
    pub name: String,
    /// Leaf slug segment.
    pub path: String,
    pub full_path: String,
    /// `None` marks a top-level (parent) group.
    pub parent_id: Option<u64>,
    pub web_url: String,
}

impl Group {
    pub fn is_parent(&self) -> bool {
        self.parent_id.is_none()
    }
}
