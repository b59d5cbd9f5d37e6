//! Rapid serial visual presentation: grouping words and pacing groups.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GlassesError;

/// Pacing and grouping of an RSVP stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsvpConfig {
    /// Words shown at once, at least 1
    pub words_per_group: usize,
    /// Reading speed in words per minute, greater than 0
    pub wpm: u32,
    /// Token used to right-pad the final group
    pub padding_char: String,
}

impl Default for RsvpConfig {
    fn default() -> Self {
        Self {
            words_per_group: 1,
            wpm: 250,
            padding_char: "...".to_string(),
        }
    }
}

impl RsvpConfig {
    pub fn new(words_per_group: usize, wpm: u32, padding_char: impl Into<String>) -> Result<Self, GlassesError> {
        let config = Self {
            words_per_group,
            wpm,
            padding_char: padding_char.into(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GlassesError> {
        if self.words_per_group == 0 {
            return Err(GlassesError::InvalidConfig(
                "words_per_group must be at least 1".to_string(),
            ));
        }
        if self.wpm == 0 {
            return Err(GlassesError::InvalidConfig("wpm must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Delay applied per word: `min(60 / wpm - 0.1, 0.1)` seconds, floored at zero.
    ///
    /// The lens itself spends roughly 0.1s per screen change, so this caps the
    /// extra wait near 0.1s for most reading speeds.
    pub fn word_delay(&self) -> Duration {
        let screen_delay = 60.0 / f64::from(self.wpm);
        let delay = (screen_delay - 0.1).min(0.1);
        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Sleep after each displayed or settling group
    pub fn group_delay(&self) -> Duration {
        self.word_delay() * self.words_per_group as u32
    }
}

/// Join words into groups of `words_per_group`, padding the last group so
/// every group has the same number of tokens.
pub fn group_words(words: &[&str], config: &RsvpConfig) -> Vec<String> {
    let size = config.words_per_group.max(1);
    words
        .chunks(size)
        .map(|chunk| {
            let mut group: Vec<&str> = chunk.to_vec();
            group.resize(size, config.padding_char.as_str());
            group.join(" ")
        })
        .collect()
}

/// Full display sequence for `text`: `words_per_group - 1` empty settling
/// groups followed by the word groups. Empty when the text has no words.
pub fn build_groups(text: &str, config: &RsvpConfig) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let settling = config.words_per_group.saturating_sub(1);
    let mut groups = vec![String::new(); settling];
    groups.extend(group_words(&words, config));
    groups
}
