//! Fixed challenge-target enumerations for the chain game.
//!
//! A challenge must read `"<category> - <target>"`. When the model names
//! only the category, the turn protocol repairs the challenge by drawing a
//! target from the matching set below.

use once_cell::sync::Lazy;

use crate::rooms::taxonomy;

pub const BOOKS_OF_THE_BIBLE: &str = "Books of the Bible";
pub const PALACE_ROOMS: &str = "Palace Rooms";
pub const PRINCIPLES: &str = "Principles";

pub const BOOKS: &[&str] = &[
    "Genesis", "Exodus", "Leviticus", "Numbers", "Deuteronomy", "Joshua", "Judges", "Ruth",
    "1 Samuel", "2 Samuel", "1 Kings", "2 Kings", "1 Chronicles", "2 Chronicles", "Ezra",
    "Nehemiah", "Esther", "Job", "Psalms", "Proverbs", "Ecclesiastes", "Song of Solomon",
    "Isaiah", "Jeremiah", "Lamentations", "Ezekiel", "Daniel", "Hosea", "Joel", "Amos",
    "Obadiah", "Jonah", "Micah", "Nahum", "Habakkuk", "Zephaniah", "Haggai", "Zechariah",
    "Malachi", "Matthew", "Mark", "Luke", "John", "Acts", "Romans", "1 Corinthians",
    "2 Corinthians", "Galatians", "Ephesians", "Philippians", "Colossians", "1 Thessalonians",
    "2 Thessalonians", "1 Timothy", "2 Timothy", "Titus", "Philemon", "Hebrews", "James",
    "1 Peter", "2 Peter", "1 John", "2 John", "3 John", "Jude", "Revelation",
];

/// A challenge category together with its concrete targets.
#[derive(Debug, Clone)]
pub struct TargetSet {
    /// Category name as it appears in a challenge
    pub name: &'static str,
    /// Concrete targets; never empty
    pub targets: Vec<String>,
}

impl TargetSet {
    /// Whether a target belongs to this set, ignoring case.
    pub fn contains(&self, target: &str) -> bool {
        let target = target.trim();
        self.targets.iter().any(|t| t.eq_ignore_ascii_case(target))
    }
}

static TARGET_SETS: Lazy<Vec<TargetSet>> = Lazy::new(|| {
    let palace = taxonomy();

    let rooms = palace
        .categories
        .iter()
        .map(|c| c.name.to_string())
        .collect();

    let principles = palace
        .enumerated()
        .flat_map(|c| {
            c.labels
                .unwrap_or_default()
                .iter()
                .map(move |label| format!("{} {}", c.code, label))
        })
        .collect();

    vec![
        TargetSet {
            name: BOOKS_OF_THE_BIBLE,
            targets: BOOKS.iter().map(|b| b.to_string()).collect(),
        },
        TargetSet {
            name: PALACE_ROOMS,
            targets: rooms,
        },
        TargetSet {
            name: PRINCIPLES,
            targets: principles,
        },
    ]
});

/// Every challenge category the game knows how to repair.
pub fn target_sets() -> &'static [TargetSet] {
    &TARGET_SETS
}

/// Find the target set for a category name, ignoring case and padding.
pub fn targets_for(category: &str) -> Option<&'static TargetSet> {
    let category = category.trim();
    TARGET_SETS
        .iter()
        .find(|set| set.name.eq_ignore_ascii_case(category))
}
