//! The ontology sense card.
//!
//! A bounded textual artifact describing one ontology (counts, root
//! classes, labeling conventions, URI patterns, a worked example). The
//! runtime consumes it as an opaque string — it is generated offline and
//! never regenerated per query.

use std::fs;
use std::path::Path;

/// Maximum sense-card length in chars.
pub const SENSE_CARD_MAX: usize = 15_000;

/// A bounded, opaque ontology description injected once per run.
#[derive(Debug, Clone, Default)]
pub struct SenseCard(String);

impl SenseCard {
    /// Wrap a string, truncating past [`SENSE_CARD_MAX`] with a marker.
    pub fn from_string(text: impl Into<String>) -> Self {
        let text = text.into();
        if let Some((i, _)) = text.char_indices().nth(SENSE_CARD_MAX) {
            let clipped = text[..i].to_string();
            let dropped = text.len() - i;
            Self(format!("{clipped}\n[...truncated {dropped} chars]"))
        } else {
            Self(text)
        }
    }

    /// Read a sense card from a file.
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self::from_string(fs::read_to_string(path)?))
    }

    /// The card text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the card is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
