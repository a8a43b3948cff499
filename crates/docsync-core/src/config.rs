//! Listen configuration: which change kinds to include and how to listen.

use serde::{Deserialize, Serialize};

use crate::error::UsageError;
use crate::types::ChangeKind;

// ─── ListenMode ───────────────────────────────────────────────────────────────

/// How the event source adapter listens to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListenMode {
    /// Stay registered and emit every tick until unsubscribed.
    #[default]
    Continuous,
    /// Emit exactly one snapshot, then complete.
    OneShot,
}

impl std::fmt::Display for ListenMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continuous => write!(f, "continuous"),
            Self::OneShot => write!(f, "one-shot"),
        }
    }
}

impl std::str::FromStr for ListenMode {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous" | "on" => Ok(Self::Continuous),
            "one-shot" | "oneshot" | "once" => Ok(Self::OneShot),
            other => Err(UsageError::UnknownListenMode(other.to_string())),
        }
    }
}

// ─── ChangeFilter ─────────────────────────────────────────────────────────────

/// Filter over change kinds (empty = all kinds).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeFilter {
    kinds: Vec<ChangeKind>,
}

impl ChangeFilter {
    /// A filter that lets every kind through.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a filter from a list of kinds; an empty list means all kinds.
    pub fn kinds(kinds: impl IntoIterator<Item = ChangeKind>) -> Self {
        let mut kinds: Vec<_> = kinds.into_iter().collect();
        kinds.sort();
        kinds.dedup();
        Self { kinds }
    }

    /// Build a filter for callers whose contract requires at least one kind.
    pub fn non_empty(kinds: impl IntoIterator<Item = ChangeKind>) -> Result<Self, UsageError> {
        let filter = Self::kinds(kinds);
        if filter.kinds.is_empty() {
            return Err(UsageError::EmptyKindSet);
        }
        Ok(filter)
    }

    /// Parse a comma-separated list such as `"added,removed"`.
    pub fn parse_list(list: &str) -> Result<Self, UsageError> {
        let kinds = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<ChangeKind>, _>>()?;
        Ok(Self::kinds(kinds))
    }

    /// Returns `true` if `kind` passes this filter.
    pub fn matches(&self, kind: ChangeKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }

    /// Returns `true` if the filter lets every kind through.
    pub fn is_all(&self) -> bool {
        self.kinds.is_empty() || self.kinds.len() == ChangeKind::ALL.len()
    }

    /// The effective kinds, with the empty filter expanded to all kinds.
    pub fn effective_kinds(&self) -> Vec<ChangeKind> {
        if self.kinds.is_empty() {
            ChangeKind::ALL.to_vec()
        } else {
            self.kinds.clone()
        }
    }
}

// ─── ListenConfig ─────────────────────────────────────────────────────────────

/// Per-stream configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Change kinds to include (empty = all).
    #[serde(default)]
    pub kinds: ChangeFilter,
    /// Listen mode.
    #[serde(default)]
    pub mode: ListenMode,
}

impl ListenConfig {
    /// Continuous listen over all change kinds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given kinds.
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = ChangeKind>) -> Self {
        self.kinds = ChangeFilter::kinds(kinds);
        self
    }

    /// Set the change filter.
    pub fn with_filter(mut self, filter: ChangeFilter) -> Self {
        self.kinds = filter;
        self
    }

    /// Set the listen mode.
    pub fn mode(mut self, mode: ListenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for a one-shot listen.
    pub fn once() -> Self {
        Self::default().mode(ListenMode::OneShot)
    }
}
