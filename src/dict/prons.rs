use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use super::{DictError, WordId, END_WD, EPS, START_WD};

#[derive(Debug, Clone)]
struct PronEntry {
    word: String,
    /// Most likely pronunciation, space-separated phones. May be empty.
    pron: String,
    no_prons: u32,
}

/// Word ↔ id table with pronunciation counts and phone strings.
///
/// The reserved markers [`EPS`], [`START_WD`] and [`END_WD`] are always
/// present with ids 0, 1 and 2.
#[derive(Debug, Clone)]
pub struct Pronunciations {
    entries: Vec<PronEntry>,
    index: HashMap<String, WordId>,
}

impl Default for Pronunciations {
    fn default() -> Self {
        Self::new()
    }
}

impl Pronunciations {
    /// A dictionary holding only the reserved markers.
    pub fn new() -> Self {
        let mut p = Self {
            entries: Vec::new(),
            index: HashMap::new(),
        };
        for marker in [EPS, START_WD, END_WD] {
            p.insert(marker, 1, String::new());
        }
        p
    }

    /// Load a dictionary file (see [`Pronunciations::from_text`]).
    pub fn open(path: &Path) -> Result<Self, DictError> {
        let text = fs::read_to_string(path)?;
        Self::from_text(&text)
    }

    /// Parse the text format: one `WORD <no_prons> [PHONE ...]` per line.
    ///
    /// Blank lines and lines starting with `#` are skipped. A later line for
    /// the same word replaces the earlier entry.
    pub fn from_text(text: &str) -> Result<Self, DictError> {
        let mut p = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            // Non-empty after trim, so there is at least one field.
            let word = fields.next().unwrap_or_default();
            let count_field = fields.next().ok_or_else(|| DictError::Parse {
                line: lineno + 1,
                reason: format!("missing pronunciation count for '{word}'"),
            })?;
            let no_prons: u32 = count_field.parse().map_err(|e| DictError::Parse {
                line: lineno + 1,
                reason: format!("invalid pronunciation count '{count_field}': {e}"),
            })?;
            if no_prons == 0 {
                return Err(DictError::Parse {
                    line: lineno + 1,
                    reason: format!("'{word}' has zero pronunciations"),
                });
            }
            let pron = fields.collect::<Vec<_>>().join(" ");
            p.insert(word, no_prons, pron);
        }
        debug!(words = p.len(), "pronunciation dictionary loaded");
        Ok(p)
    }

    fn insert(&mut self, word: &str, no_prons: u32, pron: String) -> WordId {
        if let Some(&id) = self.index.get(word) {
            let entry = &mut self.entries[id as usize];
            entry.no_prons = no_prons;
            entry.pron = pron;
            return id;
        }
        let id = self.entries.len() as WordId;
        self.entries.push(PronEntry {
            word: word.to_string(),
            pron,
            no_prons,
        });
        self.index.insert(word.to_string(), id);
        id
    }

    /// Id of `word`, appending it (one pronunciation, no phones) if unknown.
    pub fn get_idx(&mut self, word: &str) -> WordId {
        match self.index.get(word) {
            Some(&id) => id,
            None => {
                debug!(word, "unknown word added to pronunciation dictionary");
                self.insert(word, 1, String::new())
            }
        }
    }

    /// Id of `word` without modifying the dictionary.
    pub fn lookup(&self, word: &str) -> Option<WordId> {
        self.index.get(word).copied()
    }

    /// # Panics
    ///
    /// Panics if `id` was not issued by this dictionary.
    pub fn word(&self, id: WordId) -> &str {
        &self.entries[id as usize].word
    }

    /// Phone string of the most likely pronunciation (possibly empty).
    pub fn pron(&self, id: WordId) -> &str {
        &self.entries[id as usize].pron
    }

    pub fn pron_count(&self, id: WordId) -> u32 {
        self.entries[id as usize].no_prons
    }

    /// Length of `id` in phones, or in characters when no phones are known.
    /// Markers are no exception: `!SENT_START` counts 11.
    pub fn pron_length(&self, id: WordId) -> usize {
        let entry = &self.entries[id as usize];
        if entry.pron.is_empty() {
            entry.word.chars().count()
        } else {
            entry.pron.split_whitespace().count()
        }
    }

    pub fn eps_id(&self) -> WordId {
        0
    }

    pub fn start_id(&self) -> WordId {
        1
    }

    pub fn end_id(&self) -> WordId {
        2
    }

    /// True for the epsilon and sentence-boundary markers.
    pub fn is_marker(&self, id: WordId) -> bool {
        id <= self.end_id()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
