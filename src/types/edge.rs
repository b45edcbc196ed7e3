//! Dependency edge types.

use serde::{Deserialize, Serialize};
use super::variable::VariableId;

/// Why an origin variable requires its destination.
///
/// Informational only: every kind is followed identically during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum RequirementKind {
    /// Coordinate variable (e.g. latitude for a gridded field).
    Coordinate,
    /// Dimension variable.
    Dimension,
    /// Variable needed to subset the origin.
    SubsetControl,
    /// Grouping variable.
    Grouping,
    /// Default/unspecified.
    Other,
}

impl RequirementKind {
    /// Parse a requirement kind from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "coordinate" => Some(Self::Coordinate),
            "dimension" => Some(Self::Dimension),
            "subset_control" | "subset-control" => Some(Self::SubsetControl),
            "grouping" => Some(Self::Grouping),
            "other" | "" => Some(Self::Other),
            _ => None,
        }
    }
}

impl TryFrom<String> for RequirementKind {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s).ok_or_else(|| format!("unknown requirement kind: {s}"))
    }
}

impl Default for RequirementKind {
    fn default() -> Self {
        Self::Other
    }
}

impl std::fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Coordinate => write!(f, "coordinate"),
            Self::Dimension => write!(f, "dimension"),
            Self::SubsetControl => write!(f, "subset_control"),
            Self::Grouping => write!(f, "grouping"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Directed "requires" relation: `origin` cannot be processed without `destination`.
///
/// Implements `Ord` for canonical ordering: (origin, destination, kind).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Variable that has the requirement.
    pub origin: VariableId,
    /// Variable that is required.
    pub destination: VariableId,
    /// Kind of requirement.
    #[serde(default)]
    pub kind: RequirementKind,
}

impl DependencyEdge {
    /// Create a new edge.
    pub fn new(origin: impl Into<String>, destination: impl Into<String>, kind: RequirementKind) -> Self {
        Self {
            origin: VariableId::new(origin),
            destination: VariableId::new(destination),
            kind,
        }
    }

    /// Create an edge of unspecified kind.
    pub fn requires(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::new(origin, destination, RequirementKind::Other)
    }

    /// True if the edge points back at its own origin.
    pub fn is_self_loop(&self) -> bool {
        self.origin == self.destination
    }
}
