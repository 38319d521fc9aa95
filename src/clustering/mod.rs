//! Clustering of lattice links into confusion bins.
//!
//! [`Clustering::new`] partitions the surviving links into word occurrences
//! and records which occurrences must precede which. [`Clustering::go_cluster`]
//! then merges the most similar unordered pair until no candidate remains,
//! keeping the precedence relation transitively closed. After the last stage
//! [`Clustering::add_eps`] turns each cluster into a probability distribution
//! and [`Clustering::top_sort`] lays the clusters out left to right.

mod cluster;
mod merge;
mod relation;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::dict::{Pronunciations, WordId};
use crate::lattice::{Lattice, NodeId};
use crate::topsort;

pub use cluster::{Cluster, ClusterDump};
pub use relation::{Relation, SimMatrix};

/// Clustering passes, in the order the pipeline runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Merge links of the same word by time overlap.
    IntraWord = 1,
    /// Merge different words by pronunciation similarity.
    Phonetic = 2,
    /// Merge different words by spelling similarity.
    Orthographic = 3,
    /// Force a total order, merging whatever is still unordered.
    TotalOrder = 4,
}

impl Stage {
    pub fn number(self) -> u8 {
        self as u8
    }
}

/// How the similarity of a merged cluster to a third one is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Linkage {
    /// Highest pairwise similarity.
    #[default]
    Max,
    /// Pairwise similarities averaged, weighted by cluster size.
    Avg,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown clustering method '{0}' (expected 'max' or 'avg')")]
pub struct ParseLinkageError(String);

impl FromStr for Linkage {
    type Err = ParseLinkageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" => Ok(Linkage::Max),
            "avg" => Ok(Linkage::Avg),
            other => Err(ParseLinkageError(other.to_string())),
        }
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Linkage::Max => "max",
            Linkage::Avg => "avg",
        })
    }
}

/// The clusters of one lattice with their precedence constraints.
#[derive(Debug, Clone)]
pub struct Clustering {
    clusters: Vec<Cluster>,
    /// `(i, j)`: cluster `i` precedes cluster `j`. Transitively closed.
    constraints: BTreeSet<(usize, usize)>,
    no_links: usize,
}

impl Clustering {
    /// Build the initial partition of `lat`'s links.
    ///
    /// Pruned and epsilon links are left out but remembered as bridges
    /// between their end nodes; sentence markers are skipped. With node
    /// times, links sharing start time, end time and word form one cluster;
    /// without, links sharing word and `max_dist` span do.
    pub fn new(lat: &Lattice, prons: &Pronunciations) -> Self {
        let mut removed: HashSet<(NodeId, NodeId)> = HashSet::new();
        let mut clusters: Vec<Cluster> = Vec::new();
        let mut no_links = 0;

        for link in lat.links() {
            if link.pruned {
                removed.insert((link.start, link.end));
                continue;
            }
            no_links += 1;
            if link.word == prons.eps_id() {
                removed.insert((link.start, link.end));
                continue;
            }
            if link.word == prons.start_id() || link.word == prons.end_id() {
                continue;
            }

            let found = if lat.has_time_info() {
                let (start, end) = (lat.start_time(link), lat.end_time(link));
                let mut found = None;
                // Clusters come in end-time order; only the trailing run
                // with the same end time can match.
                for (k, c) in clusters.iter().enumerate().rev() {
                    if c.end_time(lat) != end {
                        break;
                    }
                    if c.match_start_word(lat, start, link.word) {
                        found = Some(k);
                        break;
                    }
                }
                found
            } else {
                let start = lat.node(link.start).max_dist;
                let end = lat.node(link.end).max_dist;
                clusters.iter().position(|c| {
                    c.word(lat) == link.word
                        && c.approx_start_time(lat) == start
                        && c.approx_end_time(lat) == end
                })
            };

            match found {
                Some(k) => clusters[k].add_link(lat, link),
                None => {
                    let id = clusters.len();
                    clusters.push(Cluster::new(id, lat, link));
                }
            }
        }

        let n = clusters.len();
        let mut ordered = vec![vec![false; n]; n];
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let candidate = if lat.has_time_info() {
                    i < j && clusters[i].end_time(lat) <= clusters[j].start_time(lat)
                } else {
                    true
                };
                if candidate && clusters[i].is_less(&clusters[j], lat, &removed) {
                    ordered[i][j] = true;
                }
            }
        }
        // Warshall
        for k in 0..n {
            for i in 0..n {
                if ordered[i][k] {
                    for j in 0..n {
                        if ordered[k][j] {
                            ordered[i][j] = true;
                        }
                    }
                }
            }
        }
        let constraints: BTreeSet<(usize, usize)> = (0..n)
            .flat_map(|i| (0..n).map(move |j| (i, j)))
            .filter(|&(i, j)| ordered[i][j])
            .collect();

        debug!(
            clusters = n,
            links = no_links,
            constraints = constraints.len(),
            bridged = removed.len(),
            "initial partition"
        );
        Self {
            clusters,
            constraints,
            no_links,
        }
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn constraints(&self) -> &BTreeSet<(usize, usize)> {
        &self.constraints
    }

    pub fn no_clusters(&self) -> usize {
        self.clusters.len()
    }

    /// Non-pruned links seen while partitioning, markers and epsilons included.
    pub fn no_links(&self) -> usize {
        self.no_links
    }

    /// Whether cluster `i` must precede cluster `j`.
    pub fn precedes(&self, i: usize, j: usize) -> bool {
        self.constraints.contains(&(i, j))
    }

    /// Compute every cluster's per-word posterior mass.
    pub fn fill_words(&mut self, lat: &Lattice) {
        for c in &mut self.clusters {
            c.fill_words(lat);
        }
    }

    /// Distinct words over all clusters.
    pub fn no_words(&self, lat: &Lattice) -> usize {
        self.clusters
            .iter()
            .flat_map(|c| c.links().iter().map(|&l| lat.link(l).word))
            .collect::<HashSet<WordId>>()
            .len()
    }

    /// Convert word masses to linear probabilities and give the missing
    /// mass, scaled by `del_weight`, to a deletion entry.
    pub fn add_eps(&mut self, lat: &Lattice, del_weight: f64) {
        let total = lat.total_prob();
        let tolerance = (-20f64).exp();
        for c in &mut self.clusters {
            let mut bin: BTreeMap<Option<WordId>, f64> = BTreeMap::new();
            let mut mass = 0.0;
            for (&word, &score) in c.word_posteriors() {
                if score > total && score - total >= tolerance {
                    warn!(cluster = c.id, word, score, total, "word posterior exceeds total");
                }
                let p = (score - total).exp();
                bin.insert(Some(word), p);
                mass += p;
            }
            if mass < 1.0 {
                bin.insert(None, (1.0 - mass) * del_weight);
            } else if mass - 1.0 >= tolerance {
                warn!(cluster = c.id, mass, "cluster probability exceeds one");
            }
            c.bin = bin;
        }
    }

    /// Order the clusters consistently with the constraints and renumber
    /// them left to right.
    pub fn top_sort(&mut self) {
        let n = self.clusters.len();
        let mut successors = vec![Vec::new(); n];
        for &(i, j) in &self.constraints {
            successors[i].push(j);
        }
        let order = topsort::dfs_order(&successors, 0..n);

        let mut new_id = vec![0; n];
        for (k, &old) in order.iter().enumerate() {
            new_id[old] = k;
        }
        let mut slots: Vec<Option<Cluster>> =
            std::mem::take(&mut self.clusters).into_iter().map(Some).collect();
        self.clusters = order
            .iter()
            .filter_map(|&old| slots[old].take())
            .enumerate()
            .map(|(k, mut c)| {
                c.id = k;
                c
            })
            .collect();
        self.constraints = self
            .constraints
            .iter()
            .map(|&(i, j)| (new_id[i], new_id[j]))
            .collect();
    }

    /// Debug listing of every cluster.
    pub fn dump(&self, lat: &Lattice, prons: &Pronunciations, show_links: bool, show_words: bool) -> String {
        let mut out = String::new();
        for c in &self.clusters {
            out.push_str(&c.dump(lat, prons, show_links, show_words).to_string());
            out.push('\n');
        }
        out
    }
}
