pub mod clustering;
pub mod dict;
pub mod lattice;
pub mod pipeline;
pub mod prob;
pub mod sausage;
pub mod settings;
pub mod similarity;
pub mod topsort;
pub mod trace_init;

#[cfg(test)]
mod testutil;

pub use clustering::{Clustering, Linkage, Stage};
pub use dict::{Pronunciations, WordId};
pub use lattice::{Lattice, LatticeError, LatticeFormat};
pub use pipeline::{Consensus, ConsensusError, ConsensusOptions, Pruning};
pub use sausage::{BinPruning, ConfusionNetwork};
