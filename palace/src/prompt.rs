//! Prompt assembly from the palace taxonomy.
//!
//! Builds the vocabulary section of a system prompt so the model is told,
//! up front, which category/label pairs exist.

use crate::types::{Floor, Taxonomy};

/// Assembles prompt fragments from a taxonomy.
pub struct PromptAssembler;

impl PromptAssembler {
    /// Build the closed-vocabulary section of a system prompt.
    pub fn build_vocabulary_prompt(taxonomy: &Taxonomy) -> String {
        let mut prompt = String::new();

        prompt.push_str("# PALACE VOCABULARY\n\n");
        prompt.push_str("Cite rooms only by the codes below. When you tag a principle, write it as\n");
        prompt.push_str("(CODE - Label), using ONLY the labels listed for that room.\n\n");

        for floor in Floor::all_ascending() {
            prompt.push_str(&format!("## {} FLOOR\n", floor.as_str()));

            for category in taxonomy.on_floor(floor) {
                match category.labels {
                    Some(labels) => prompt.push_str(&format!(
                        "- {} ({}): {}\n",
                        category.code,
                        category.name,
                        labels.join(", ")
                    )),
                    None => {
                        prompt.push_str(&format!("- {} ({})\n", category.code, category.name))
                    }
                }
            }

            prompt.push('\n');
        }

        prompt.push_str(&format!("Taxonomy version: {}\n", taxonomy.version));

        prompt
    }

    /// Build an "avoid these" reminder for multi-turn sessions.
    ///
    /// Returns an empty string when there is nothing to avoid.
    pub fn build_avoid_prompt(used_references: &[String], used_categories: &[String]) -> String {
        if used_references.is_empty() && used_categories.is_empty() {
            return String::new();
        }

        let mut prompt = String::from("# ALREADY COVERED\n\n");

        if !used_references.is_empty() {
            prompt.push_str(&format!(
                "Do not reuse these references: {}\n",
                used_references.join("; ")
            ));
        }

        if !used_categories.is_empty() {
            prompt.push_str(&format!(
                "Prefer rooms other than: {}\n",
                used_categories.join(", ")
            ));
        }

        prompt
    }
}
