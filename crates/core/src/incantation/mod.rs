use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::net::{INCANTATION_WINDOW_MS, REQUIRED_REPETITIONS};

pub const INCANTATION_PHRASE: &str = "my power shoves thee";

static INCANTATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?i)\b(?P<target>[\w-]+)[,.]?\s+{}",
        regex::escape(INCANTATION_PHRASE)
    );
    Regex::new(&pattern).unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncantationPhrase {
    pub text: String,
    pub recognized_at: u64,
}

/// Repetition count per case-folded target name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChargeSnapshot {
    counts: BTreeMap<String, u32>,
}

impl ChargeSnapshot {
    pub fn get(&self, target: &str) -> u32 {
        self.counts
            .get(&target.to_lowercase())
            .copied()
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Targets at or above `required`, highest count first, then by name.
    pub fn charged(&self, required: u32) -> Vec<(String, u32)> {
        let mut charged: Vec<(String, u32)> = self
            .counts
            .iter()
            .filter(|(_, count)| **count >= required)
            .map(|(name, count)| (name.clone(), *count))
            .collect();
        charged.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        charged
    }

    fn add(&mut self, target: &str) {
        *self.counts.entry(target.to_lowercase()).or_insert(0) += 1;
    }
}

/// The full incantation aimed at `target`.
pub fn incantation_for(target: &str) -> String {
    format!("{}, {}", target, INCANTATION_PHRASE)
}

/// Extracts every target named in `text`, in order of appearance.
pub fn match_targets(text: &str) -> Vec<String> {
    INCANTATION_RE
        .captures_iter(text)
        .filter_map(|caps| caps.name("target"))
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

#[derive(Debug, Clone)]
pub struct IncantationBuffer {
    phrases: Vec<IncantationPhrase>,
    charges: ChargeSnapshot,
    window_ms: u64,
    required: u32,
}

impl Default for IncantationBuffer {
    fn default() -> Self {
        Self::new(INCANTATION_WINDOW_MS, REQUIRED_REPETITIONS)
    }
}

impl IncantationBuffer {
    pub fn new(window_ms: u64, required: u32) -> Self {
        Self {
            phrases: Vec::new(),
            charges: ChargeSnapshot::default(),
            window_ms,
            required,
        }
    }

    /// Stores the phrase, recounts the window and returns the targets that
    /// reached the cast threshold.
    pub fn append(&mut self, text: impl Into<String>, now: u64) -> Vec<(String, u32)> {
        self.phrases.push(IncantationPhrase {
            text: text.into(),
            recognized_at: now,
        });
        self.recompute(now);
        self.charges.charged(self.required)
    }

    /// Rebuilds the charge snapshot from phrases inside the window. Expired
    /// phrases stay stored until [`clear`](Self::clear).
    pub fn recompute(&mut self, now: u64) -> &ChargeSnapshot {
        let mut charges = ChargeSnapshot::default();
        for phrase in self.active_phrases(now) {
            for target in match_targets(&phrase.text) {
                charges.add(&target);
            }
        }
        self.charges = charges;
        &self.charges
    }

    pub fn active_phrases(&self, now: u64) -> impl Iterator<Item = &IncantationPhrase> {
        let window_ms = self.window_ms;
        self.phrases
            .iter()
            .filter(move |p| now.saturating_sub(p.recognized_at) < window_ms)
    }

    pub fn charges(&self) -> &ChargeSnapshot {
        &self.charges
    }

    pub fn required(&self) -> u32 {
        self.required
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn clear(&mut self) {
        self.phrases.clear();
        self.charges = ChargeSnapshot::default();
    }
}
