//! Link scoring, Forward-Backward and posterior pruning.

use tracing::{debug, debug_span, warn};

use super::{Lattice, LatticeError};
use crate::dict::Pronunciations;
use crate::prob::{log_plus, LnProb, LZERO};

/// Largest tolerated |alpha(end) - beta(start)|.
const FB_TOLERANCE: f64 = 1e-9;

impl Lattice {
    /// `score = (ac + lmscale*lm + prscale*pr - wip) / allscale`.
    pub fn compute_link_scores(&mut self, lmscale: f64, prscale: f64, wip: f64, allscale: f64) {
        for link in &mut self.links {
            link.score =
                (link.ac_score + lmscale * link.lm_score + prscale * link.pr_score - wip) / allscale;
        }
    }

    pub fn scale_link_scores(&mut self, scale: f64) {
        for link in &mut self.links {
            link.score /= scale;
        }
    }

    /// Subtract a word insertion penalty from every link.
    pub fn add_wip(&mut self, wip: f64) {
        for link in &mut self.links {
            link.score -= wip;
        }
    }

    /// Add a weighted uniform pronunciation score, `-ln(no_prons)`.
    pub fn add_prons(&mut self, prons: &Pronunciations, weight: f64) {
        for link in &mut self.links {
            let uniform = -f64::from(prons.pron_count(link.word)).ln();
            link.score += weight * uniform;
        }
    }

    /// Give every link a uniform pronunciation score when the file has none.
    ///
    /// The file is taken to have none when the first link's `r` field is
    /// missing or zero. Returns whether the uniform scores were applied.
    pub fn put_uniform_pron_prob(&mut self, prons: &Pronunciations) -> bool {
        let first = self.links[0].pr_score;
        if first != LZERO && first.abs() >= (-20f64).exp() {
            return false;
        }
        for link in &mut self.links {
            link.pr_score = -f64::from(prons.pron_count(link.word)).ln();
        }
        true
    }

    /// Compute link posteriors and the total path probability.
    ///
    /// The lattice starts at the first link's start node and ends at the
    /// last link's end node. Links on no complete path get [`LZERO`].
    pub fn do_forward_backward(&mut self) -> Result<(), LatticeError> {
        let _span = debug_span!("forward_backward", links = self.links.len()).entered();

        let n = self.nodes.len();
        let start = self.links[0].start;
        let end = self.links[self.links.len() - 1].end;

        let mut alpha: Vec<Option<LnProb>> = vec![None; n];
        alpha[start] = Some(0.0);
        for link in &self.links {
            if let Some(a) = alpha[link.start] {
                let s = a + link.score;
                alpha[link.end] = Some(match alpha[link.end] {
                    None => s,
                    Some(prev) => log_plus(s, prev),
                });
            }
        }

        let mut beta: Vec<Option<LnProb>> = vec![None; n];
        beta[end] = Some(0.0);
        for link in self.links.iter().rev() {
            if let Some(b) = beta[link.end] {
                let s = b + link.score;
                beta[link.start] = Some(match beta[link.start] {
                    None => s,
                    Some(prev) => log_plus(s, prev),
                });
            }
        }

        let total = alpha[end].ok_or(LatticeError::NoCompletePath)?;
        let back = beta[start].ok_or(LatticeError::NoCompletePath)?;
        if (total - back).abs() > FB_TOLERANCE {
            warn!(alpha = total, beta = back, "forward and backward totals diverge");
        }
        self.total_prob = total;

        for link in &mut self.links {
            link.posterior = match (alpha[link.start], beta[link.end]) {
                (Some(a), Some(b)) => a + link.score + b,
                _ => LZERO,
            };
        }
        debug!(total_prob = total, "forward-backward done");
        Ok(())
    }

    /// Keep the `thresh` percent of links with the highest posteriors.
    pub fn mark_pruned_percentage(&mut self, thresh: f64) {
        let n = self.links.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| self.links[b].posterior.total_cmp(&self.links[a].posterior));

        let limit = thresh / 100.0 * n as f64;
        let mut pruned = 0;
        for (rank, &id) in order.iter().enumerate() {
            if rank as f64 > limit {
                self.links[id].pruned = true;
                pruned += 1;
            }
        }
        debug!(thresh, pruned, "percentage pruning");
    }

    /// Prune links whose posterior is more than `thresh` times smaller than
    /// the total probability. A non-positive threshold disables pruning.
    pub fn mark_pruned_score(&mut self, thresh: f64) {
        if thresh <= 0.0 {
            return;
        }
        let total = self.total_prob;
        let mut pruned = 0;
        for link in &mut self.links {
            if (total - link.posterior).exp() > thresh {
                link.pruned = true;
                pruned += 1;
            }
        }
        debug!(thresh, pruned, "score pruning");
    }
}
