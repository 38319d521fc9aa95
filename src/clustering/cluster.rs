use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::dict::{Pronunciations, WordId};
use crate::lattice::{Lattice, Link, LinkId, NodeId};
use crate::prob::{log_plus, LnProb};

use super::Stage;

/// A group of links taken to be one word occurrence.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub(super) id: usize,
    /// Member links; the first one represents the cluster while the initial
    /// partition is built.
    links: Vec<LinkId>,
    /// Log posterior mass per word, filled by [`Cluster::fill_words`].
    word_posteriors: BTreeMap<WordId, LnProb>,
    best_link: LinkId,
    min_time: f64,
    max_time: f64,
    /// Linear probabilities per word (`None` = deletion), set by `add_eps`.
    pub(super) bin: BTreeMap<Option<WordId>, f64>,
}

impl Cluster {
    pub fn new(id: usize, lat: &Lattice, link: &Link) -> Self {
        let mut c = Self {
            id,
            links: Vec::new(),
            word_posteriors: BTreeMap::new(),
            best_link: link.id,
            min_time: 100_000.0,
            max_time: -1.0,
            bin: BTreeMap::new(),
        };
        c.add_link(lat, link);
        c
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn links(&self) -> &[LinkId] {
        &self.links
    }

    pub fn no_links(&self) -> usize {
        self.links.len()
    }

    pub fn word_posteriors(&self) -> &BTreeMap<WordId, LnProb> {
        &self.word_posteriors
    }

    /// Linear word probabilities after deletion mass was added.
    pub fn bin(&self) -> &BTreeMap<Option<WordId>, f64> {
        &self.bin
    }

    pub fn best_link(&self) -> LinkId {
        self.best_link
    }

    /// Earliest start, in seconds or `max_dist` units.
    pub fn min_time(&self) -> f64 {
        self.min_time
    }

    /// Latest end, in seconds or `max_dist` units.
    pub fn max_time(&self) -> f64 {
        self.max_time
    }

    pub fn add_link(&mut self, lat: &Lattice, link: &Link) {
        self.links.push(link.id);
        let (start, end) = lat.span(link);
        if self.min_time > start {
            self.min_time = start;
        }
        if self.max_time < end {
            self.max_time = end;
        }
        if link.posterior > lat.link(self.best_link).posterior {
            self.best_link = link.id;
        }
    }

    /// Sum the link posteriors of each word.
    pub fn fill_words(&mut self, lat: &Lattice) {
        for &id in &self.links {
            let link = lat.link(id);
            self.word_posteriors
                .entry(link.word)
                .and_modify(|p| *p = log_plus(*p, link.posterior))
                .or_insert(link.posterior);
        }
    }

    /// Absorb `other`. Word masses are merged only once they exist, i.e.
    /// after the intra-word stage.
    pub fn merge_with(&mut self, lat: &Lattice, other: Cluster, stage: Stage) {
        if lat.link(self.best_link).posterior < lat.link(other.best_link).posterior {
            self.best_link = other.best_link;
        }
        self.links.extend(other.links);
        if stage != Stage::IntraWord {
            for (word, p) in other.word_posteriors {
                self.word_posteriors
                    .entry(word)
                    .and_modify(|q| *q = log_plus(*q, p))
                    .or_insert(p);
            }
        }
        self.min_time = self.min_time.min(other.min_time);
        self.max_time = self.max_time.max(other.max_time);
    }

    fn first(&self) -> LinkId {
        self.links[0]
    }

    /// Word of the representative link.
    pub fn word(&self, lat: &Lattice) -> WordId {
        lat.link(self.first()).word
    }

    pub fn start_time(&self, lat: &Lattice) -> f64 {
        lat.start_time(lat.link(self.first()))
    }

    pub fn end_time(&self, lat: &Lattice) -> f64 {
        lat.end_time(lat.link(self.first()))
    }

    pub fn approx_start_time(&self, lat: &Lattice) -> i32 {
        lat.node(lat.link(self.first()).start).max_dist
    }

    pub fn approx_end_time(&self, lat: &Lattice) -> i32 {
        lat.node(lat.link(self.first()).end).max_dist
    }

    /// The representative link starts at `start_time` with `word`.
    pub fn match_start_word(&self, lat: &Lattice, start_time: f64, word: WordId) -> bool {
        let link = lat.link(self.first());
        lat.start_time(link) == start_time && link.word == word
    }

    /// Some link of `self` ends where a link of `other` starts, directly or
    /// across a pair of nodes joined by a pruned or epsilon link.
    pub fn is_less(
        &self,
        other: &Cluster,
        lat: &Lattice,
        removed: &HashSet<(NodeId, NodeId)>,
    ) -> bool {
        for &l1 in &self.links {
            let end1 = lat.link(l1).end;
            for &l2 in &other.links {
                let start2 = lat.link(l2).start;
                if end1 == start2 {
                    return true;
                }
                if end1 < start2 && removed.contains(&(end1, start2)) {
                    return true;
                }
            }
        }
        false
    }

    /// Some link of `self` ends at or before (within `max_dist` links) the
    /// start of a link of `other`. Reachability answers are cached in `memo`.
    pub fn compare_less(
        &self,
        other: &Cluster,
        lat: &Lattice,
        memo: &mut HashMap<(NodeId, NodeId), bool>,
        max_dist: u32,
    ) -> bool {
        for &l1 in &self.links {
            let first = lat.link(l1).end;
            for &l2 in &other.links {
                let second = lat.link(l2).start;
                if first == second {
                    return true;
                }
                if first > second {
                    continue;
                }
                match memo.get(&(first, second)) {
                    Some(&answer) => {
                        if answer {
                            return true;
                        }
                    }
                    None => {
                        if max_dist > 1 {
                            let answer = lat.less_nodes(first, second, max_dist);
                            memo.insert((first, second), answer);
                            if answer {
                                return true;
                            }
                        }
                    }
                }
            }
        }
        false
    }

    /// Debug listing of the member links and/or word masses.
    pub fn dump<'a>(
        &'a self,
        lat: &'a Lattice,
        prons: &'a Pronunciations,
        show_links: bool,
        show_words: bool,
    ) -> ClusterDump<'a> {
        ClusterDump {
            cluster: self,
            lat,
            prons,
            show_links,
            show_words,
        }
    }
}

pub struct ClusterDump<'a> {
    cluster: &'a Cluster,
    lat: &'a Lattice,
    prons: &'a Pronunciations,
    show_links: bool,
    show_words: bool,
}

impl fmt::Display for ClusterDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.cluster;
        writeln!(f, "Cluster no {:<6}  {} -- {}", c.id, c.min_time, c.max_time)?;
        writeln!(f, "-----------------")?;
        if self.show_links {
            if self.show_words {
                writeln!(f, "Links:")?;
            }
            for &id in &c.links {
                let link = self.lat.link(id);
                let (start, end) = self.lat.span(link);
                let label = if self.lat.has_time_info() { "Time" } else { "Approx time" };
                writeln!(
                    f,
                    " S={:<5} E={:<5} W={:<20} {label}: {start:<5} -- {end:<10}Prob={:<10}",
                    link.start,
                    link.end,
                    self.prons.word(link.word),
                    link.posterior
                )?;
            }
        }
        if self.show_words {
            if self.show_links {
                writeln!(f, "Words:")?;
            }
            for (&word, p) in &c.word_posteriors {
                writeln!(f, " {}\t{}", self.prons.word(word), p)?;
            }
        }
        Ok(())
    }
}
