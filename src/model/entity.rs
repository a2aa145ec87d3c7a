// ABOUTME: Workbook and datasource entities and the references callers use to name them
// ABOUTME: Entities compare by kind and luid so resolution can treat them as a set

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Workbook,
    Datasource,
}

/// A workbook or datasource on the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

/// How a caller identifies an entity before it has been looked up
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum EntityRef {
    Id { kind: EntityKind, id: String },
    Name { kind: EntityKind, name: String },
}

impl Entity {
    pub fn new(kind: EntityKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
            project: None,
        }
    }

    pub fn workbook(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(EntityKind::Workbook, id, name)
    }

    pub fn datasource(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(EntityKind::Datasource, id, name)
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn is_workbook(&self) -> bool {
        self.kind == EntityKind::Workbook
    }

    /// Reference to this entity by luid
    pub fn as_ref_by_id(&self) -> EntityRef {
        EntityRef::Id {
            kind: self.kind,
            id: self.id.clone(),
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.id.hash(state);
    }
}

impl EntityRef {
    pub fn by_id(kind: EntityKind, id: impl Into<String>) -> Self {
        EntityRef::Id { kind, id: id.into() }
    }

    pub fn by_name(kind: EntityKind, name: impl Into<String>) -> Self {
        EntityRef::Name {
            kind,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Id { kind, .. } | EntityRef::Name { kind, .. } => *kind,
        }
    }

    /// The luid or name carried by this reference
    pub fn value(&self) -> &str {
        match self {
            EntityRef::Id { id, .. } => id,
            EntityRef::Name { name, .. } => name,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Workbook => write!(f, "workbook"),
            EntityKind::Datasource => write!(f, "datasource"),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' (luid: {})", self.kind, self.name, self.id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Id { kind, id } => write!(f, "{} luid '{}'", kind, id),
            EntityRef::Name { kind, name } => write!(f, "{} named '{}'", kind, name),
        }
    }
}
