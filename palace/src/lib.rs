//! Study-palace taxonomy for the Jeeves orchestration service.
//!
//! The palace is a closed vocabulary of "rooms" (category codes), grouped by
//! floor. Some rooms enumerate the only sub-category labels a model may
//! attach to them; those are what the hallucination gate enforces.
//!
//! # Key Components
//!
//! - [`Taxonomy`]: versioned, immutable set of [`Category`] entries
//! - [`taxonomy()`]: the process-wide palace, loaded once
//! - [`targets_for`]: fixed target enumerations used to repair vague chain-game challenges
//! - [`PromptAssembler`]: renders the vocabulary into a system-prompt section
//!
//! # Example
//!
//! ```
//! let dr = palace::taxonomy().get("DR").unwrap();
//! assert!(dr.allows("christ"));
//! assert!(!dr.allows("Divine Attributes"));
//! ```

pub mod prompt;
pub mod rooms;
pub mod targets;
pub mod types;

// Re-export main types
pub use prompt::PromptAssembler;
pub use rooms::{taxonomy, TAXONOMY_VERSION};
pub use targets::{target_sets, targets_for, TargetSet};
pub use types::*;
