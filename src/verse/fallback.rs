//! Embedded verses used whenever the remote source is unavailable.

use super::{Verse, VerseId};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

/// `(text, book, verse number, global number)`.
const FALLBACK_VERSES: &[(&str, &str, u32, u32)] = &[
    ("إِنَّ اللَّهَ مَعَ الصَّابِرِينَ", "Al-Baqarah", 153, 160),
    ("رَبِّ اشْرَحْ لِي صَدْرِي", "Ta-Ha", 25, 2373),
    (
        "إِنَّ اللَّهَ لَا يُغَيِّرُ مَا بِقَوْمٍ حَتَّى يُغَيِّرُوا مَا بِأَنفُسِهِمْ",
        "Ar-Ra'd",
        11,
        1717,
    ),
    ("وَمَا تَوْفِيقِي إِلَّا بِاللَّهِ", "Hud", 88, 1561),
    ("فَإِنَّ مَعَ الْعُسْرِ يُسْرًا", "Ash-Sharh", 5, 6095),
];

/// All embedded verses.
#[must_use]
pub fn fallback_verses() -> Vec<Verse> {
    FALLBACK_VERSES.iter().map(to_verse).collect()
}

/// Pick an embedded verse uniformly at random. Never fails.
#[must_use]
pub fn pick_fallback() -> Verse {
    to_verse(&FALLBACK_VERSES[random_index(FALLBACK_VERSES.len())])
}

/// Like [`pick_fallback`] but never returns `exclude` unless it is the only verse.
#[must_use]
pub fn pick_fallback_excluding(exclude: &VerseId) -> Verse {
    let candidates: Vec<Verse> = fallback_verses()
        .into_iter()
        .filter(|verse| verse.id() != *exclude)
        .collect();
    if candidates.is_empty() {
        return pick_fallback();
    }
    let idx = random_index(candidates.len());
    candidates[idx].clone()
}

fn to_verse(entry: &(&str, &str, u32, u32)) -> Verse {
    let (text, book, verse_number, global_number) = *entry;
    Verse::new(text, book, verse_number, global_number)
}

/// Index in `0..len` from the OS CSPRNG, or the thread RNG if the OS source fails.
fn random_index(len: usize) -> usize {
    debug_assert!(len > 0);
    let mut bytes = [0u8; 4];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => u32::from_le_bytes(bytes) as usize % len,
        Err(e) => {
            tracing::debug!("OS random source unavailable ({e}), using thread rng");
            rand::thread_rng().gen_range(0..len)
        }
    }
}
