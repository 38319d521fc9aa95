//! Pronunciation dictionary.
//!
//! `Pronunciations` maps words to dense integer ids and carries, per word,
//! the number of known pronunciations and the most likely phone string.
//! Lattice parsing interns every word label through it.

mod prons;

pub use prons::Pronunciations;

use std::io;

/// Dense index of a word in [`Pronunciations`].
pub type WordId = u32;

/// Epsilon / null word label.
pub const EPS: &str = "!NULL";
/// Sentence-start marker.
pub const START_WD: &str = "!SENT_START";
/// Sentence-end marker.
pub const END_WD: &str = "!SENT_END";

/// Error type for loading pronunciation dictionaries.
#[derive(Debug, thiserror::Error)]
pub enum DictError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}
