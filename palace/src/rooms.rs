//! The study palace: every room the model may cite.
//!
//! Rooms with a `labels` allow-list are the ones the vocabulary gate
//! enforces. Everything else is pass-through.

use once_cell::sync::Lazy;

use crate::types::{Category, Floor, Taxonomy};

/// Current taxonomy version.
pub const TAXONOMY_VERSION: &str = "2024.3";

pub const DIMENSIONS: &[&str] = &["Literal", "Christ", "Me", "Church", "Heaven"];

pub const CONNECT_SIX: &[&str] = &[
    "Prophecy", "Parable", "Epistle", "History", "Gospel", "Poetry",
];

pub const TIME_ZONES: &[&str] = &[
    "Heaven-Past",
    "Heaven-Present",
    "Heaven-Future",
    "Earth-Past",
    "Earth-Present",
    "Earth-Future",
];

pub const SANCTUARY: &[&str] = &[
    "Gate", "Altar", "Laver", "Lampstand", "Table", "Incense", "Veil", "Ark",
];

pub const FEASTS: &[&str] = &[
    "Passover",
    "Unleavened Bread",
    "Firstfruits",
    "Pentecost",
    "Trumpets",
    "Atonement",
    "Tabernacles",
];

pub const THREE_ANGELS: &[&str] = &["First Angel", "Second Angel", "Third Angel"];

pub const FRUIT: &[&str] = &[
    "Love",
    "Joy",
    "Peace",
    "Longsuffering",
    "Gentleness",
    "Goodness",
    "Faith",
    "Meekness",
    "Temperance",
];

static PALACE: Lazy<Taxonomy> = Lazy::new(|| Taxonomy::new(TAXONOMY_VERSION, default_rooms()));

/// The process-wide taxonomy, built on first use.
pub fn taxonomy() -> &'static Taxonomy {
    &PALACE
}

fn room(code: &'static str, name: &'static str, floor: Floor) -> Category {
    Category {
        code,
        name,
        floor,
        labels: None,
    }
}

fn enumerated(
    code: &'static str,
    name: &'static str,
    floor: Floor,
    labels: &'static [&'static str],
) -> Category {
    Category {
        code,
        name,
        floor,
        labels: Some(labels),
    }
}

fn default_rooms() -> Vec<Category> {
    vec![
        // Furnishing
        room("SR", "Story Room", Floor::Furnishing),
        room("IR", "Imagination Room", Floor::Furnishing),
        room("FPS", "24 Frames Room", Floor::Furnishing),
        room("BR", "Bible Rendered Room", Floor::Furnishing),
        room("TR", "Translation Room", Floor::Furnishing),
        room("GR", "Gems Room", Floor::Furnishing),
        // Investigation
        room("OR", "Observation Room", Floor::Investigation),
        room("DC", "Def-Com Room", Floor::Investigation),
        room("ST", "Symbols and Types Room", Floor::Investigation),
        room("QR", "Questions Room", Floor::Investigation),
        room("QA", "Q&A Chains Room", Floor::Investigation),
        // Freestyle
        room("NF", "Nature Freestyle", Floor::Freestyle),
        room("PF", "Personal Freestyle", Floor::Freestyle),
        room("BF", "Bible Freestyle", Floor::Freestyle),
        room("HF", "History Freestyle", Floor::Freestyle),
        room("LR", "Listening Room", Floor::Freestyle),
        // Next level
        room("CR", "Concentration Room", Floor::NextLevel),
        enumerated("DR", "Dimensions Room", Floor::NextLevel, DIMENSIONS),
        enumerated("C6", "Connect-6 Room", Floor::NextLevel, CONNECT_SIX),
        enumerated("TZ", "Time Zone Room", Floor::NextLevel, TIME_ZONES),
        room("PRm", "Patterns Room", Floor::NextLevel),
        room("PA", "Parallels Room", Floor::NextLevel),
        enumerated("FRt", "Fruit Room", Floor::NextLevel, FRUIT),
        // Vision
        enumerated("BL", "Blue Room", Floor::Vision, SANCTUARY),
        room("PR", "Prophecy Room", Floor::Vision),
        enumerated("3A", "Three Angels Room", Floor::Vision, THREE_ANGELS),
        enumerated("FE", "Feasts Room", Floor::Vision, FEASTS),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_unique() {
        let codes: Vec<_> = taxonomy().codes().collect();
        let unique: HashSet<_> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len());
    }

    #[test]
    fn test_required_enumerations() {
        let dr = taxonomy().get("DR").unwrap();
        assert_eq!(dr.allowed_labels(), vec!["Literal", "Christ", "Me", "Church", "Heaven"]);

        let c6 = taxonomy().get("C6").unwrap();
        assert_eq!(
            c6.allowed_labels(),
            vec!["Prophecy", "Parable", "Epistle", "History", "Gospel", "Poetry"]
        );
    }

    #[test]
    fn test_every_floor_has_rooms() {
        for floor in Floor::all_ascending() {
            assert!(taxonomy().on_floor(floor).count() > 0, "{} is empty", floor.as_str());
        }
    }

    #[test]
    fn test_serializes_without_empty_labels() {
        let json = serde_json::to_value(taxonomy().get("SR").unwrap()).unwrap();
        assert!(json.get("labels").is_none());
        assert_eq!(json["floor"], "furnishing");
    }
}
