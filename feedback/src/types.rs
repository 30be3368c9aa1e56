use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog identifier. The data service hands out numbers for some
/// entities and strings for others.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(i64),
    Text(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{n}"),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Number(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Text(id.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Lab {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub hosted_url: Option<String>,
}

/// The owning lab as embedded in an experiment
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LabRef {
    pub id: EntityId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Experiment {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub content_url: Option<String>,
    #[serde(default)]
    pub simulation_url: Option<String>,
    pub lab: LabRef,
}
