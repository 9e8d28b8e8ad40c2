//! Core types for the palace taxonomy.
//!
//! A taxonomy is a closed vocabulary: every room has a short category code,
//! and some rooms additionally enumerate the only sub-category labels the
//! model is allowed to attach to them.

use serde::Serialize;

/// Floor of the palace a room lives on.
///
/// Floors only group rooms for display and prompting; they carry no
/// validation semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Floor {
    /// Memory furnishing - getting the stories in
    Furnishing = 1,
    /// Close reading and definition work
    Investigation = 2,
    /// Free association across nature, history and life
    Freestyle = 3,
    /// Christ-centred depth rooms
    NextLevel = 4,
    /// Sanctuary, prophecy and feast patterns
    Vision = 5,
}

impl Floor {
    /// Get string representation for prompts
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Furnishing => "FURNISHING",
            Self::Investigation => "INVESTIGATION",
            Self::Freestyle => "FREESTYLE",
            Self::NextLevel => "NEXT LEVEL",
            Self::Vision => "VISION",
        }
    }

    /// All floors, ground floor first
    pub fn all_ascending() -> Vec<Self> {
        vec![
            Self::Furnishing,
            Self::Investigation,
            Self::Freestyle,
            Self::NextLevel,
            Self::Vision,
        ]
    }
}

/// A single taxonomy bucket ("room").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    /// Short fixed identifier, matched case-sensitively (e.g. `DR`)
    pub code: &'static str,
    /// Display name (e.g. "Dimensions Room")
    pub name: &'static str,
    /// Floor this room belongs to
    pub floor: Floor,
    /// Allowed sub-category labels; `None` means unconstrained
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<&'static [&'static str]>,
}

impl Category {
    /// Whether this category enumerates its valid labels.
    pub fn is_enumerated(&self) -> bool {
        self.labels.is_some()
    }

    /// Check a label against the allow-list, ignoring case.
    ///
    /// Unconstrained categories accept every label.
    pub fn allows(&self, label: &str) -> bool {
        match self.labels {
            Some(labels) => {
                let label = label.trim();
                labels.iter().any(|l| l.eq_ignore_ascii_case(label))
            }
            None => true,
        }
    }

    /// Allowed labels as owned strings (empty for unconstrained rooms).
    pub fn allowed_labels(&self) -> Vec<String> {
        self.labels
            .map(|labels| labels.iter().map(|l| l.to_string()).collect())
            .unwrap_or_default()
    }
}

/// An immutable, versioned set of categories.
#[derive(Debug, Clone, Serialize)]
pub struct Taxonomy {
    /// Version tag, bumped whenever a code or label changes
    pub version: &'static str,
    /// Categories in palace order
    pub categories: Vec<Category>,
}

impl Taxonomy {
    /// Build a taxonomy from explicit parts.
    pub fn new(version: &'static str, categories: Vec<Category>) -> Self {
        Self {
            version,
            categories,
        }
    }

    /// Look up a category by its exact code.
    pub fn get(&self, code: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.code == code)
    }

    /// Look up a category by display name, ignoring case.
    pub fn by_name(&self, name: &str) -> Option<&Category> {
        let name = name.trim();
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Categories that enumerate their labels.
    pub fn enumerated(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(|c| c.is_enumerated())
    }

    /// Every category code, in palace order.
    pub fn codes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.categories.iter().map(|c| c.code)
    }

    /// Rooms on a given floor.
    pub fn on_floor(&self, floor: Floor) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(move |c| c.floor == floor)
    }
}
