//! Shared types for the change-stream pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{UsageError, WriteError};

/// Field data of a single document.
pub type DocumentData = Map<String, Value>;

// ─── ChangeKind ───────────────────────────────────────────────────────────────

/// The closed set of change kinds a classified action can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl ChangeKind {
    /// All kinds, in canonical order.
    pub const ALL: [ChangeKind; 3] = [Self::Added, Self::Modified, Self::Removed];

    /// The native wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChangeKind {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "added" => Ok(Self::Added),
            "modified" => Ok(Self::Modified),
            "removed" => Ok(Self::Removed),
            other => Err(UsageError::UnknownChangeKind(other.to_string())),
        }
    }
}

// ─── Native records ───────────────────────────────────────────────────────────

/// A document as delivered by the remote store.
///
/// `id` is optional because the native layer does not guarantee it; a change
/// whose document has no id is rejected by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub data: DocumentData,
}

impl DocumentSnapshot {
    pub fn new(id: impl Into<String>, data: DocumentData) -> Self {
        Self {
            id: Some(id.into()),
            data,
        }
    }

    /// Returns `true` if the snapshot carries a non-empty id.
    pub fn exists(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// One raw change record, exactly as the native listener reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    /// Native change type (`"added"`, `"modified"`, `"removed"`).
    pub kind: String,
    /// The changed document.
    pub document: DocumentSnapshot,
    /// Id of the document immediately preceding this one in query order,
    /// `None` if the document is now first.
    #[serde(default)]
    pub previous_id: Option<String>,
    /// Position of the document before this change, if it was present.
    #[serde(default)]
    pub old_index: Option<usize>,
}

impl RawChange {
    pub fn new(
        kind: ChangeKind,
        document: DocumentSnapshot,
        previous_id: Option<String>,
    ) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            document,
            previous_id,
            old_index: None,
        }
    }

    /// Attach the pre-change position.
    pub fn with_old_index(mut self, index: usize) -> Self {
        self.old_index = Some(index);
        self
    }
}

/// Everything one native callback invocation delivers: the query's ordered
/// documents as of this tick plus the batch of changes that produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySnapshot {
    #[serde(default)]
    pub documents: Vec<DocumentSnapshot>,
    #[serde(default)]
    pub changes: Vec<RawChange>,
}

// ─── Classified records ───────────────────────────────────────────────────────

/// One row of a maintained projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedDocument {
    pub id: String,
    pub data: DocumentData,
}

impl OrderedDocument {
    pub fn new(id: impl Into<String>, data: DocumentData) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// A classified change, ready for the projection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeAction {
    pub kind: ChangeKind,
    pub document: OrderedDocument,
    /// Id of the preceding document in query order (`None` = first).
    pub ordering_hint: Option<String>,
    /// Position of the document before the change, when the store reports it.
    pub previous_index: Option<usize>,
}

impl ChangeAction {
    pub fn id(&self) -> &str {
        &self.document.id
    }
}

// ─── Operation targets ────────────────────────────────────────────────────────

/// A reference to a single document: collection path plus document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub path: String,
    pub id: String,
}

impl DocumentRef {
    pub fn new(path: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.path, self.id)
    }
}

/// Anything a write operation can be aimed at.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationTarget {
    ById(String),
    ByReference(DocumentRef),
    BySnapshot(DocumentSnapshot),
}

impl OperationTarget {
    /// Resolve the target to a document id inside `collection`.
    pub fn resolve<'a>(&'a self, collection: &str) -> Result<&'a str, WriteError> {
        match self {
            Self::ById(id) => Ok(id),
            Self::ByReference(r) if r.path == collection => Ok(&r.id),
            Self::ByReference(r) => Err(WriteError::ForeignReference {
                path: r.path.clone(),
                id: r.id.clone(),
                collection: collection.to_string(),
            }),
            Self::BySnapshot(snapshot) => match snapshot.id.as_deref() {
                Some(id) if !id.is_empty() => Ok(id),
                _ => Err(WriteError::MissingId),
            },
        }
    }
}

impl From<&str> for OperationTarget {
    fn from(id: &str) -> Self {
        Self::ById(id.to_string())
    }
}

impl From<String> for OperationTarget {
    fn from(id: String) -> Self {
        Self::ById(id)
    }
}

impl From<DocumentRef> for OperationTarget {
    fn from(r: DocumentRef) -> Self {
        Self::ByReference(r)
    }
}

impl From<DocumentSnapshot> for OperationTarget {
    fn from(s: DocumentSnapshot) -> Self {
        Self::BySnapshot(s)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_kind_parses_case_insensitively() {
        assert_eq!("Added".parse::<ChangeKind>().unwrap(), ChangeKind::Added);
        assert_eq!(" removed ".parse::<ChangeKind>().unwrap(), ChangeKind::Removed);
        assert_eq!(
            "moved".parse::<ChangeKind>(),
            Err(UsageError::UnknownChangeKind("moved".into()))
        );
    }

    #[test]
    fn change_kind_serde_is_lowercase() {
        let json = serde_json::to_string(&ChangeKind::Modified).unwrap();
        assert_eq!(json, "\"modified\"");
    }

    #[test]
    fn target_resolves_each_variant() {
        let by_id = OperationTarget::from("a");
        assert_eq!(by_id.resolve("animals").unwrap(), "a");

        let by_ref = OperationTarget::from(DocumentRef::new("animals", "b"));
        assert_eq!(by_ref.resolve("animals").unwrap(), "b");

        let by_snap = OperationTarget::from(DocumentSnapshot::new("c", DocumentData::new()));
        assert_eq!(by_snap.resolve("animals").unwrap(), "c");
    }

    #[test]
    fn target_rejects_foreign_reference_and_missing_id() {
        let foreign = OperationTarget::from(DocumentRef::new("plants", "x"));
        assert!(matches!(
            foreign.resolve("animals"),
            Err(WriteError::ForeignReference { .. })
        ));

        let anonymous = OperationTarget::from(DocumentSnapshot::default());
        assert_eq!(anonymous.resolve("animals"), Err(WriteError::MissingId));
    }

    #[test]
    fn snapshot_exists_requires_non_empty_id() {
        assert!(DocumentSnapshot::new("a", DocumentData::new()).exists());
        assert!(!DocumentSnapshot::default().exists());
        assert!(!DocumentSnapshot::new("", DocumentData::new()).exists());
    }
}
