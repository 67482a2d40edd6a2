//! Verse model, remote source, embedded fallback list and repetition tracking.

pub mod fallback;
pub mod source;
pub mod tracker;

pub use fallback::pick_fallback;
pub use source::{AlQuranCloudSource, VerseSource};
pub use tracker::UsageTracker;

use crate::error::{ReminderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A displayable verse. Field names on the wire match the persisted `lastAyah` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verse {
    /// Verse text in the original script.
    #[serde(rename = "text")]
    pub display_text: String,
    /// Book (surah) name.
    #[serde(rename = "surah")]
    pub source_book: String,
    /// Number of the verse within its book, starting at 1.
    #[serde(rename = "ayah")]
    pub verse_number: u32,
    /// Cross-book number, used for the deep link.
    #[serde(rename = "number")]
    pub global_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

impl Verse {
    #[must_use]
    pub fn new(
        display_text: impl Into<String>,
        source_book: impl Into<String>,
        verse_number: u32,
        global_number: u32,
    ) -> Self {
        Self {
            display_text: display_text.into(),
            source_book: source_book.into(),
            verse_number,
            global_number,
            translation: None,
        }
    }

    /// Attach a translation.
    #[must_use]
    pub fn with_translation(mut self, translation: impl Into<String>) -> Self {
        self.translation = Some(translation.into());
        self
    }

    /// Identifier used for repetition checks (`book-number`).
    #[must_use]
    pub fn id(&self) -> VerseId {
        VerseId(format!("{}-{}", self.source_book, self.verse_number))
    }

    /// Secondary line shown under the verse, e.g. `Al-Baqarah 153`.
    #[must_use]
    pub fn reference_line(&self) -> String {
        format!("{} {}", self.source_book, self.verse_number)
    }
}

/// Repetition identifier: book name plus in-book verse number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerseId(String);

impl VerseId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Well-known verses that can be requested by name.
const PRESETS: &[(&str, u32, u32)] = &[
    ("kursi", 2, 255),
    ("fatiha", 1, 1),
    ("nasr", 110, 1),
    ("ikhlas", 112, 1),
    ("falaq", 113, 1),
    ("nas", 114, 1),
];

/// A request for a specific verse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerseReference {
    /// `surah:ayah`, e.g. `2:255`.
    InBook { surah: u32, ayah: u32 },
    /// Global verse number, 1..=6236.
    Global(u32),
}

impl VerseReference {
    /// Parse `"2:255"`, `"262"`, or a preset name such as `"kursi"`.
    ///
    /// # Errors
    ///
    /// Returns [`ReminderError::Contract`] for anything else.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let normalized = trimmed.to_ascii_lowercase();

        if let Some((_, surah, ayah)) = PRESETS.iter().find(|(name, _, _)| *name == normalized) {
            return Ok(Self::InBook {
                surah: *surah,
                ayah: *ayah,
            });
        }

        if let Some((surah, ayah)) = trimmed.split_once(':') {
            let surah = parse_positive(surah, "surah")?;
            let ayah = parse_positive(ayah, "ayah")?;
            return Ok(Self::InBook { surah, ayah });
        }

        parse_positive(trimmed, "verse number").map(Self::Global)
    }

    /// Path segment understood by the verse API.
    #[must_use]
    pub fn to_path_segment(self) -> String {
        match self {
            Self::InBook { surah, ayah } => format!("{surah}:{ayah}"),
            Self::Global(number) => number.to_string(),
        }
    }
}

fn parse_positive(raw: &str, what: &str) -> Result<u32> {
    match raw.trim().parse::<u32>() {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(ReminderError::Contract(format!(
            "invalid {what} `{}` in verse reference",
            raw.trim()
        ))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn verse_serializes_with_store_field_names() {
        let verse = Verse::new("فَإِنَّ مَعَ الْعُسْرِ يُسْرًا", "Ash-Sharh", 5, 6095);
        let json = serde_json::to_value(&verse).unwrap();
        assert_eq!(json["text"], "فَإِنَّ مَعَ الْعُسْرِ يُسْرًا");
        assert_eq!(json["surah"], "Ash-Sharh");
        assert_eq!(json["ayah"], 5);
        assert_eq!(json["number"], 6095);
        assert!(json.get("translation").is_none());
    }

    #[test]
    fn id_and_reference_line_use_book_and_number() {
        let verse = Verse::new("x", "Ta-Ha", 25, 2373);
        assert_eq!(verse.id().as_str(), "Ta-Ha-25");
        assert_eq!(verse.reference_line(), "Ta-Ha 25");
    }

    #[test]
    fn parses_reference_forms() {
        assert_eq!(
            VerseReference::parse("2:255").unwrap(),
            VerseReference::InBook { surah: 2, ayah: 255 }
        );
        assert_eq!(
            VerseReference::parse(" Kursi ").unwrap(),
            VerseReference::InBook { surah: 2, ayah: 255 }
        );
        assert_eq!(
            VerseReference::parse("262").unwrap(),
            VerseReference::Global(262)
        );
        assert_eq!(VerseReference::parse("112:1").unwrap().to_path_segment(), "112:1");
    }

    #[test]
    fn rejects_malformed_references() {
        for raw in ["", "0", "2:0", "abc", "2:x", "-1"] {
            assert!(
                VerseReference::parse(raw).is_err(),
                "`{raw}` should be rejected"
            );
        }
    }

    #[test]
    fn translation_survives_round_trip_through_store_json() {
        let verse =
            Verse::new("t", "Hud", 88, 1561).with_translation("My success is only by Allah.");
        let restored: Verse =
            serde_json::from_value(serde_json::to_value(&verse).unwrap()).unwrap();
        assert_eq!(restored, verse);
    }
}
