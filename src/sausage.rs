//! Confusion networks ("sausages") and their text and JSON renderings.

use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clustering::Clustering;
use crate::dict::{Pronunciations, END_WD, EPS, START_WD};

/// Label used for the deletion entry in sausage files.
pub const EPS_LABEL: &str = "eps";

/// One alternative of a bin. `word == None` is the deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinEntry {
    pub word: Option<String>,
    pub score: f64,
}

impl BinEntry {
    pub fn is_eps(&self) -> bool {
        self.word.is_none()
    }

    pub fn label(&self) -> &str {
        self.word.as_deref().unwrap_or(EPS_LABEL)
    }
}

/// Alternatives for one position, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub entries: Vec<BinEntry>,
}

impl Bin {
    pub fn best(&self) -> Option<&BinEntry> {
        self.entries.first()
    }
}

/// Thresholds applied when writing bins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinPruning {
    /// Drop a non-best deletion scoring at or below this.
    pub low_eps: f64,
    /// Drop a bin whose best entry is a deletion scoring above this.
    pub high_eps: f64,
    /// Drop non-best words scoring at or below this.
    pub low_word: f64,
    /// Keep only the best word when it scores above this.
    pub high_word: f64,
}

impl Default for BinPruning {
    fn default() -> Self {
        Self {
            low_eps: 0.0,
            high_eps: 1.0,
            low_word: 0.0,
            high_word: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionNetwork {
    pub label: String,
    pub bins: Vec<Bin>,
}

impl ConfusionNetwork {
    /// Read the bins off a sorted clustering whose deletion mass was added.
    pub fn from_clustering(label: impl Into<String>, clustering: &Clustering, prons: &Pronunciations) -> Self {
        let bins = clustering
            .clusters()
            .iter()
            .map(|c| {
                // Deletion first, then word ids ascending; the sort is stable.
                let mut entries: Vec<BinEntry> = c
                    .bin()
                    .iter()
                    .map(|(&word, &score)| BinEntry {
                        word: word.map(|w| prons.word(w).to_string()),
                        score,
                    })
                    .collect();
                entries.sort_by(|a, b| b.score.total_cmp(&a.score));
                Bin { entries }
            })
            .collect();
        Self {
            label: label.into(),
            bins,
        }
    }

    /// Best real word of every bin, each followed by a space.
    pub fn consensus(&self) -> String {
        let mut out = String::new();
        for bin in &self.bins {
            if let Some(BinEntry { word: Some(w), .. }) = bin.best() {
                out.push_str(w);
                out.push(' ');
            }
        }
        out
    }

    /// `"<consensus>\t(<label>)"`, without a newline.
    pub fn consensus_line(&self) -> String {
        format!("{}\t({})", self.consensus(), self.label)
    }

    /// Write the network as an FSM: one arc per kept alternative, framed by
    /// sentence markers and closed by the final state.
    pub fn write_sausage<W: Write>(&self, out: &mut W, pruning: &BinPruning) -> io::Result<()> {
        write_arc(out, 0, 1, START_WD, 1.0)?;
        let mut count = 1usize;
        for bin in &self.bins {
            let Some(best) = bin.best() else {
                continue;
            };
            let rest = &bin.entries[1..];
            if best.is_eps() {
                if best.score > pruning.high_eps {
                    continue;
                }
                let words: Vec<&BinEntry> = rest
                    .iter()
                    .filter(|e| !e.is_eps() && e.score > pruning.low_word)
                    .collect();
                if words.is_empty() {
                    continue;
                }
                write_arc(out, count, count + 1, EPS_LABEL, best.score)?;
                for e in words {
                    write_arc(out, count, count + 1, e.label(), e.score)?;
                }
            } else {
                write_arc(out, count, count + 1, best.label(), best.score)?;
                if best.score <= pruning.high_word {
                    for e in rest {
                        let threshold = if e.is_eps() { pruning.low_eps } else { pruning.low_word };
                        if e.score > threshold {
                            write_arc(out, count, count + 1, e.label(), e.score)?;
                        }
                    }
                }
            }
            count += 1;
        }
        write_arc(out, count, count + 1, END_WD, 1.0)?;
        write_arc(out, count + 1, count + 2, EPS, 1.0)?;
        writeln!(out, "{}", count + 2)
    }

    /// Sausage text as a string.
    pub fn sausage_text(&self, pruning: &BinPruning) -> String {
        let mut buf = Vec::new();
        // Writing to a Vec cannot fail.
        let _ = self.write_sausage(&mut buf, pruning);
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn write_arc<W: Write>(out: &mut W, from: usize, to: usize, word: &str, score: f64) -> io::Result<()> {
    writeln!(out, "{:<6}{:<6}{:<20}{:<10}", from, to, word, format_g(score))
}

/// File name without directories, cut at the first `.`.
pub fn utterance_label(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name,
    }
}

/// Format like C's `%g`: six significant digits, trailing zeros dropped,
/// exponent notation below 1e-4 and from 1e6 up.
pub fn format_g(x: f64) -> String {
    if x == 0.0 {
        return "0".to_string();
    }
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let sci = format!("{x:.5e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if !(-4..6).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_zeros(mantissa), sign, exp.abs())
    } else {
        let fixed = format!("{:.*}", (5 - exp) as usize, x);
        trim_zeros(&fixed).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(word: Option<&str>, score: f64) -> BinEntry {
        BinEntry {
            word: word.map(str::to_string),
            score,
        }
    }

    fn sample() -> ConfusionNetwork {
        ConfusionNetwork {
            label: "utt1".to_string(),
            bins: vec![
                Bin {
                    entries: vec![
                        entry(Some("HELLO"), 0.75),
                        entry(Some("HI"), 0.2),
                        entry(None, 0.05),
                    ],
                },
                Bin {
                    entries: vec![entry(None, 0.9), entry(Some("A"), 0.1)],
                },
                Bin {
                    entries: vec![entry(Some("WORLD"), 1.0)],
                },
            ],
        }
    }

    fn arc(from: usize, to: usize, word: &str, score: &str) -> String {
        format!("{:<6}{:<6}{:<20}{:<10}\n", from, to, word, score)
    }

    #[test]
    fn test_format_g() {
        assert_eq!(format_g(0.0), "0");
        assert_eq!(format_g(1.0), "1");
        assert_eq!(format_g(0.5), "0.5");
        assert_eq!(format_g(0.7310585786300049), "0.731059");
        assert_eq!(format_g(0.0001), "0.0001");
        assert_eq!(format_g(0.00001), "1e-05");
        assert_eq!(format_g(2.5e-17), "2.5e-17");
        assert_eq!(format_g(100000.0), "100000");
        assert_eq!(format_g(1e6), "1e+06");
        assert_eq!(format_g(123456789.0), "1.23457e+08");
        assert_eq!(format_g(-3.5), "-3.5");
        assert_eq!(format_g(0.9999999999), "1");
    }

    #[test]
    fn test_utterance_label() {
        assert_eq!(utterance_label(Path::new("/data/lat/sw2001-A.lat.gz")), "sw2001-A");
        assert_eq!(utterance_label(Path::new("plain")), "plain");
        assert_eq!(utterance_label(Path::new("dir/x.y")), "x");
    }

    #[test]
    fn test_consensus_line() {
        let net = sample();
        assert_eq!(net.consensus(), "HELLO WORLD ");
        assert_eq!(net.consensus_line(), "HELLO WORLD \t(utt1)");
    }

    #[test]
    fn test_sausage_default_pruning() {
        let text = sample().sausage_text(&BinPruning::default());
        assert!(text.starts_with("0     1     !SENT_START         1         \n"));
        let expected = [
            arc(0, 1, "!SENT_START", "1"),
            arc(1, 2, "HELLO", "0.75"),
            arc(1, 2, "HI", "0.2"),
            arc(1, 2, "eps", "0.05"),
            arc(2, 3, "eps", "0.9"),
            arc(2, 3, "A", "0.1"),
            arc(3, 4, "WORLD", "1"),
            arc(4, 5, "!SENT_END", "1"),
            arc(5, 6, "!NULL", "1"),
            "6\n".to_string(),
        ]
        .concat();
        assert_eq!(text, expected);
    }

    #[test]
    fn test_sausage_bin_thresholds() {
        let pruning = BinPruning {
            low_eps: 0.1,
            high_eps: 0.8,
            low_word: 0.15,
            high_word: 1.0,
        };
        let text = sample().sausage_text(&pruning);
        let expected = [
            arc(0, 1, "!SENT_START", "1"),
            arc(1, 2, "HELLO", "0.75"),
            arc(1, 2, "HI", "0.2"),
            // the deletion-dominated bin is gone without leaving a state
            arc(2, 3, "WORLD", "1"),
            arc(3, 4, "!SENT_END", "1"),
            arc(4, 5, "!NULL", "1"),
            "5\n".to_string(),
        ]
        .concat();
        assert_eq!(text, expected);
    }

    #[test]
    fn test_sausage_confident_word_stands_alone() {
        let pruning = BinPruning {
            high_word: 0.7,
            ..BinPruning::default()
        };
        let text = sample().sausage_text(&pruning);
        assert!(text.contains(&arc(1, 2, "HELLO", "0.75")));
        assert!(!text.contains("HI"));
        assert!(!text.contains(&arc(1, 2, "eps", "0.05")));
    }

    #[test]
    fn test_deletion_only_bin_is_skipped() {
        let net = ConfusionNetwork {
            label: "x".to_string(),
            bins: vec![
                Bin {
                    entries: vec![entry(None, 0.6), entry(Some("A"), 0.0)],
                },
                Bin {
                    entries: vec![entry(Some("WORLD"), 1.0)],
                },
            ],
        };
        let text = net.sausage_text(&BinPruning::default());
        assert!(text.contains(&arc(1, 2, "WORLD", "1")));
        assert!(!text.contains("eps"));
        assert_eq!(net.consensus(), "WORLD ");
    }

    #[test]
    fn test_json_export() {
        let net = sample();
        let json = net.to_json().unwrap();
        assert!(json.contains("\"label\": \"utt1\""));
        assert!(json.contains("\"word\": null"));
        let back: ConfusionNetwork = serde_json::from_str(&json).unwrap();
        assert_eq!(back, net);
    }
}
