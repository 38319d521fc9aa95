//! Word lattices: parsing, scoring, Forward-Backward and pruning.
//!
//! A [`Lattice`] owns dense node and link arrays indexed by id. After
//! construction the node numbering is topological and links are ordered by
//! `(end, start)`, so a single pass over `links` visits every link after all
//! links entering its start node.

pub mod io;
mod scores;
#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::dict::{DictError, Pronunciations, WordId};
use crate::prob::{LnProb, LZERO};
use crate::topsort;

pub type NodeId = usize;
pub type LinkId = usize;

/// Lattice file syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatticeFormat {
    /// HTK Standard Lattice Format.
    Slf,
    /// AT&T FSM text format.
    Fsm,
}

impl fmt::Display for LatticeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatticeFormat::Slf => f.write_str("SLF"),
            LatticeFormat::Fsm => f.write_str("FSM"),
        }
    }
}

/// Error type for lattice loading and processing.
#[derive(Debug, thiserror::Error)]
pub enum LatticeError {
    #[error("cannot read lattice {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: malformed field '{field}'")]
    MalformedField { line: usize, field: String },

    #[error("line {line}: unknown identifier '{ident}'")]
    UnknownField { line: usize, ident: String },

    #[error("line {line}: invalid value '{value}' for '{ident}'")]
    InvalidValue {
        line: usize,
        ident: String,
        value: String,
    },

    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: &'static str,
        found: usize,
    },

    #[error("line {line}: node id {id} out of range (NODES={limit})")]
    NodeOutOfRange { line: usize, id: usize, limit: usize },

    #[error("line {line}: link id {id} out of range (LINKS={limit})")]
    LinkOutOfRange { line: usize, id: usize, limit: usize },

    #[error("link {0} is declared but never defined")]
    MissingLink(LinkId),

    #[error("link {0} has no word label and its end node carries none")]
    MissingWord(LinkId),

    #[error("header: {0}")]
    Header(String),

    #[error("no complete path from the start node to the end node")]
    NoCompletePath,

    #[error(transparent)]
    Dict(#[from] DictError),
}

/// Header information of a lattice file.
#[derive(Debug, Clone)]
pub struct LatticeInfo {
    pub path: PathBuf,
    pub format: LatticeFormat,
    pub utterance: String,
    pub lmscale: f64,
    pub prscale: f64,
    pub wdpenalty: f64,
    pub no_nodes: usize,
    pub no_links: usize,
}

impl LatticeInfo {
    pub fn new(path: impl Into<PathBuf>, format: LatticeFormat) -> Self {
        Self {
            path: path.into(),
            format,
            utterance: String::new(),
            lmscale: 0.0,
            prscale: 0.0,
            wdpenalty: 0.0,
            no_nodes: 0,
            no_links: 0,
        }
    }
}

impl fmt::Display for LatticeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Type={}", self.format)?;
        writeln!(f, "File name={}", self.path.display())?;
        writeln!(f, "UTTERANCE={}", self.utterance)?;
        writeln!(f, "wdpenalty={}", self.wdpenalty)?;
        writeln!(f, "lmscale={}", self.lmscale)?;
        writeln!(f, "prscale={}", self.prscale)?;
        writeln!(f, "NODES={}", self.no_nodes)?;
        writeln!(f, "LINKS={}", self.no_links)
    }
}

/// A lattice vertex.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub word: Option<WordId>,
    /// Seconds; negative when unknown.
    pub time: f64,
    /// Longest path from the lattice start in pronunciation units, used in
    /// place of `time` when the lattice has no time information.
    pub max_dist: i32,
    /// End nodes of the links leaving this node, ascending.
    pub outgoing: BTreeSet<NodeId>,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            word: None,
            time: -1.0,
            max_dist: 0,
            outgoing: BTreeSet::new(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I={:<5}", self.id)?;
        if self.time >= 0.0 {
            write!(f, "t={:<6}", self.time)?;
        }
        if let Some(w) = self.word {
            write!(f, "W={:<20}", w)?;
        }
        Ok(())
    }
}

/// A word-labelled lattice edge.
#[derive(Debug, Clone)]
pub struct Link {
    pub id: LinkId,
    pub start: NodeId,
    pub end: NodeId,
    pub word: WordId,
    pub ac_score: LnProb,
    pub lm_score: LnProb,
    pub pr_score: LnProb,
    /// Combined link score fed to Forward-Backward.
    pub score: LnProb,
    /// Log posterior: mass of all complete paths through this link.
    pub posterior: LnProb,
    pub pruned: bool,
}

impl Link {
    pub fn new(id: LinkId, start: NodeId, end: NodeId, word: WordId) -> Self {
        Self {
            id,
            start,
            end,
            word,
            ac_score: LZERO,
            lm_score: LZERO,
            pr_score: LZERO,
            score: LZERO,
            posterior: LZERO,
            pruned: false,
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " J={:<6} S={:<5} E={:<5} W={:<20}score={:<10}Pscore={:<10}",
            self.id, self.start, self.end, self.word, self.score, self.posterior
        )
    }
}

/// A word lattice with Forward-Backward posteriors.
#[derive(Debug, Clone)]
pub struct Lattice {
    info: LatticeInfo,
    nodes: Vec<Node>,
    links: Vec<Link>,
    total_prob: LnProb,
    time_info: bool,
}

impl Lattice {
    /// Assemble a lattice from parsed parts.
    ///
    /// Fills the outgoing adjacency and renumbers nodes and links
    /// topologically unless the file order already is (checked through
    /// node times, so lattices without times are always sorted).
    pub fn from_parts(
        info: LatticeInfo,
        nodes: Vec<Node>,
        links: Vec<Link>,
        time_info: bool,
    ) -> Result<Self, LatticeError> {
        if nodes.is_empty() {
            return Err(LatticeError::Header("lattice has no nodes".into()));
        }
        if links.is_empty() {
            return Err(LatticeError::Header("lattice has no links".into()));
        }
        let mut lat = Self {
            info,
            nodes,
            links,
            total_prob: LZERO,
            time_info,
        };
        lat.fill_outgoing();

        let sorted = lat.time_info && lat.check_nodes() && lat.check_links();
        if !sorted {
            lat.do_top_sort();
        }
        debug!(
            nodes = lat.no_nodes(),
            links = lat.no_links(),
            time_info = lat.time_info,
            resorted = !sorted,
            "lattice built"
        );
        Ok(lat)
    }

    fn fill_outgoing(&mut self) {
        for link in &self.links {
            self.nodes[link.start].outgoing.insert(link.end);
        }
    }

    pub fn info(&self) -> &LatticeInfo {
        &self.info
    }

    pub fn format(&self) -> LatticeFormat {
        self.info.format
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id]
    }

    pub fn no_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn no_links(&self) -> usize {
        self.links.len()
    }

    /// Log of the summed probability of all complete paths.
    pub fn total_prob(&self) -> LnProb {
        self.total_prob
    }

    pub fn has_time_info(&self) -> bool {
        self.time_info
    }

    /// Ignore node times from here on; positions fall back to `max_dist`.
    pub fn set_no_time_info(&mut self) {
        self.time_info = false;
    }

    pub fn start_time(&self, link: &Link) -> f64 {
        self.nodes[link.start].time
    }

    pub fn end_time(&self, link: &Link) -> f64 {
        self.nodes[link.end].time
    }

    /// Start and end position of `link`: node times when the lattice has
    /// them, the `max_dist` proxy otherwise.
    pub fn span(&self, link: &Link) -> (f64, f64) {
        if self.time_info {
            (self.start_time(link), self.end_time(link))
        } else {
            (
                f64::from(self.nodes[link.start].max_dist),
                f64::from(self.nodes[link.end].max_dist),
            )
        }
    }

    /// Node times never decrease with the node id.
    pub fn check_nodes(&self) -> bool {
        self.nodes.windows(2).all(|w| w[1].time >= w[0].time)
    }

    /// Link end times never decrease and every link points forward.
    pub fn check_links(&self) -> bool {
        self.links.iter().enumerate().all(|(i, link)| {
            let ordered =
                i == 0 || self.end_time(link) >= self.end_time(&self.links[i - 1]);
            ordered && link.start <= link.end
        })
    }

    /// Renumber nodes in DFS topological order and reorder links by
    /// `(end, start)`.
    pub fn do_top_sort(&mut self) {
        let successors: Vec<Vec<NodeId>> = self
            .nodes
            .iter()
            .map(|n| n.outgoing.iter().copied().collect())
            .collect();
        let order = topsort::dfs_order(&successors, (0..self.nodes.len()).rev());

        // old id -> new id
        let mut new_id = vec![0; self.nodes.len()];
        for (k, &old) in order.iter().enumerate() {
            new_id[old] = k;
        }

        let nodes = order
            .iter()
            .enumerate()
            .map(|(k, &old)| {
                let src = &self.nodes[old];
                Node {
                    id: k,
                    word: src.word,
                    time: src.time,
                    max_dist: src.max_dist,
                    outgoing: src.outgoing.iter().map(|&o| new_id[o]).collect(),
                }
            })
            .collect();
        self.nodes = nodes;

        for link in &mut self.links {
            link.start = new_id[link.start];
            link.end = new_id[link.end];
        }
        self.links.sort_by_key(|l| (l.end, l.start));
        for (i, link) in self.links.iter_mut().enumerate() {
            link.id = i;
        }
    }

    /// Whether `id2` is reachable from `id1` within `max_depth` links.
    ///
    /// Relies on the topological numbering: no path leads to a smaller id,
    /// so the search stops at the first successor past `id2`. A depth of
    /// zero only accepts `id1 == id2`.
    pub fn less_nodes(&self, id1: NodeId, id2: NodeId, max_depth: u32) -> bool {
        if max_depth == 0 {
            return id1 == id2;
        }
        for &next in &self.nodes[id1].outgoing {
            if next > id2 {
                return false;
            }
            if next == id2 {
                return true;
            }
            if max_depth > 1 && self.less_nodes(next, id2, max_depth - 1) {
                return true;
            }
        }
        false
    }

    /// Propagate the longest path length (in phones, or letters for words
    /// without a pronunciation) forward through the links.
    pub fn put_max_dist(&mut self, prons: &Pronunciations) {
        for link in &self.links {
            let length = prons.pron_length(link.word) as i32;
            let candidate = self.nodes[link.start].max_dist + length;
            let end = &mut self.nodes[link.end];
            end.max_dist = end.max_dist.max(candidate);
        }
    }

    /// Number of distinct words on the links.
    pub fn no_words(&self) -> usize {
        self.links
            .iter()
            .map(|l| l.word)
            .collect::<HashSet<_>>()
            .len()
    }
}

impl fmt::Display for Lattice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#\n#nodes\n#")?;
        for node in &self.nodes {
            writeln!(f, "{node}")?;
        }
        writeln!(f, "#\n#links\n#")?;
        for link in &self.links {
            let start = self.start_time(link);
            if start >= 0.0 {
                writeln!(
                    f,
                    "{link} {:<10} -- {:<10}",
                    start,
                    self.end_time(link)
                )?;
            } else {
                writeln!(f, "{link}")?;
            }
        }
        Ok(())
    }
}
