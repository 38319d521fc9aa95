//! The lattice-to-confusion-network driver.
//!
//! [`Consensus`] processes lattices one at a time: it scores the links,
//! computes posteriors, prunes, runs the clustering stages and writes the
//! consensus hypothesis, the sausage file and optionally a JSON export. The
//! parameter report for the `-G` log file is written while the first lattice
//! is processed.

use std::fmt::{self, Write as _};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, debug_span, info, warn};

use crate::clustering::{Clustering, Linkage, Stage};
use crate::dict::{DictError, Pronunciations};
use crate::lattice::{Lattice, LatticeError, LatticeFormat};
use crate::sausage::{format_g, utterance_label, BinPruning, ConfusionNetwork};
use crate::settings::SettingsError;

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error(transparent)]
    Dict(#[from] DictError),
    #[error(transparent)]
    Lattice(#[from] LatticeError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("JSON export: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ConsensusError + '_ {
    move |source| ConsensusError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Link pruning applied after Forward-Backward.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Pruning {
    #[default]
    None,
    /// Keep this percentage of the links, best posteriors first.
    Percentage(f64),
    /// Prune links whose posterior is more than this factor below the total.
    Score(f64),
}

impl Pruning {
    /// Combine the two command-line pruning requests. When both are given
    /// the percentage is dropped.
    pub fn resolve(score: Option<f64>, percentage: Option<f64>) -> Self {
        match (score, percentage) {
            (Some(s), Some(_)) => {
                warn!("contradictory pruning methods; using score pruning");
                Pruning::Score(s)
            }
            (Some(s), None) => Pruning::Score(s),
            (None, Some(p)) => Pruning::Percentage(p),
            (None, None) => Pruning::None,
        }
    }

    pub fn apply(self, lat: &mut Lattice) {
        match self {
            Pruning::None => {}
            Pruning::Percentage(t) => lat.mark_pruned_percentage(t),
            Pruning::Score(t) => lat.mark_pruned_score(t),
        }
    }
}

/// `score = (AC + lm_weight*LM + pr_weight*PR - wip) / scale` for SLF lattices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreFormula {
    pub lm_weight: f64,
    pub pr_weight: f64,
    pub wip: f64,
    pub scale: f64,
}

impl fmt::Display for ScoreFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "1/{}*( AC + {}*LM + {}*PR - {})",
            format_g(self.scale),
            format_g(self.lm_weight),
            format_g(self.pr_weight),
            format_g(self.wip)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ConsensusOptions {
    pub format: LatticeFormat,
    /// Pronunciation dictionary file.
    pub pron_file: PathBuf,
    /// Append consensus lines here instead of stdout.
    pub consensus_file: Option<PathBuf>,
    /// Directory for `<label>.saus` files.
    pub sausage_dir: Option<PathBuf>,
    /// Directory for `<label>.json` files.
    pub json_dir: Option<PathBuf>,
    /// Parameter report.
    pub log_file: Option<PathBuf>,
    /// Posterior scale.
    pub scale: f64,
    /// LM weight; the lattice header's `lmscale` (or 1) when unset.
    pub lm_weight: Option<f64>,
    /// Weight already applied to the LM scores in the file.
    pub lm_old_scale: f64,
    /// Pronunciation weight; the header's `prscale` (or 1) when unset.
    pub pr_weight: Option<f64>,
    pub pr_old_scale: f64,
    /// Word insertion penalty; the header's `wdpenalty` when unset.
    pub wdpenalty: Option<f64>,
    pub del_weight: f64,
    pub pruning: Pruning,
    pub intra: Linkage,
    pub inter: Linkage,
    pub constrain_intra: bool,
    pub constrain_inter: bool,
    pub use_time_info: bool,
    pub use_phon_info: bool,
    pub bin_pruning: BinPruning,
}

impl Default for ConsensusOptions {
    fn default() -> Self {
        Self {
            format: LatticeFormat::Slf,
            pron_file: PathBuf::new(),
            consensus_file: None,
            sausage_dir: None,
            json_dir: None,
            log_file: None,
            scale: 1.0,
            lm_weight: None,
            lm_old_scale: 0.0,
            pr_weight: None,
            pr_old_scale: 0.0,
            wdpenalty: None,
            del_weight: 1.0,
            pruning: Pruning::None,
            intra: Linkage::Max,
            inter: Linkage::Max,
            constrain_intra: false,
            constrain_inter: false,
            use_time_info: true,
            use_phon_info: true,
            bin_pruning: BinPruning::default(),
        }
    }
}

impl ConsensusOptions {
    /// Resolve the SLF score formula from the options and a lattice header.
    pub fn score_formula(&self, lat: &Lattice) -> ScoreFormula {
        let info = lat.info();
        let wip = match self.wdpenalty {
            Some(w) => w,
            None if info.wdpenalty != 0.0 => info.wdpenalty,
            None => 0.0,
        }
        .abs();
        let mut lm_weight = match self.lm_weight {
            Some(w) => w,
            None if info.lmscale != 0.0 => info.lmscale,
            None => 1.0,
        };
        if self.lm_old_scale > 0.0 {
            lm_weight /= self.lm_old_scale;
        }
        let mut pr_weight = match self.pr_weight {
            Some(w) => w,
            None if info.prscale != 0.0 => info.prscale,
            None => 1.0,
        };
        if self.pr_old_scale > 0.0 {
            pr_weight /= self.pr_old_scale;
        }
        ScoreFormula {
            lm_weight,
            pr_weight,
            wip,
            scale: self.scale,
        }
    }
}

fn flag(b: bool) -> u8 {
    u8::from(b)
}

fn linkage_name(l: Linkage) -> &'static str {
    match l {
        Linkage::Max => "max (single link clustering method)",
        Linkage::Avg => "avg (complete link clustering method)",
    }
}

/// Processes lattices into confusion networks.
pub struct Consensus {
    options: ConsensusOptions,
    prons: Pronunciations,
    /// Resolved on the first SLF lattice and kept for the rest.
    formula: Option<ScoreFormula>,
    processed: usize,
    log: Option<BufWriter<File>>,
}

impl Consensus {
    /// Load the pronunciation dictionary named in `options`.
    pub fn new(options: ConsensusOptions) -> Result<Self, ConsensusError> {
        let prons = Pronunciations::open(&options.pron_file)?;
        Self::with_prons(options, prons)
    }

    /// Create the output directories and the log file.
    pub fn with_prons(options: ConsensusOptions, prons: Pronunciations) -> Result<Self, ConsensusError> {
        let log = match &options.log_file {
            Some(path) => Some(BufWriter::new(File::create(path).map_err(io_err(path))?)),
            None => None,
        };
        for dir in [&options.sausage_dir, &options.json_dir].into_iter().flatten() {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
        Ok(Self {
            options,
            prons,
            formula: None,
            processed: 0,
            log,
        })
    }

    pub fn options(&self) -> &ConsensusOptions {
        &self.options
    }

    pub fn prons(&self) -> &Pronunciations {
        &self.prons
    }

    pub fn formula(&self) -> Option<ScoreFormula> {
        self.formula
    }

    /// Number of lattices processed so far.
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Process every lattice named in `list` (one path per line).
    pub fn process_list(&mut self, list: &Path) -> Result<usize, ConsensusError> {
        let file = File::open(list).map_err(io_err(list))?;
        let mut count = 0;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(io_err(list))?;
            let name = line.trim();
            if name.is_empty() {
                continue;
            }
            self.process_file(Path::new(name))?;
            count += 1;
        }
        info!(lattices = count, "done");
        Ok(count)
    }

    /// Load one lattice, build its confusion network and write the outputs.
    pub fn process_file(&mut self, path: &Path) -> Result<ConfusionNetwork, ConsensusError> {
        let _span = debug_span!("lattice", file = %path.display()).entered();
        let mut lat = Lattice::open(path, self.options.format, &mut self.prons)?;
        let net = self.build_network(&mut lat, &utterance_label(path))?;
        self.emit(&net)?;
        Ok(net)
    }

    /// Run scoring, Forward-Backward, pruning and clustering on `lat`.
    pub fn build_network(&mut self, lat: &mut Lattice, label: &str) -> Result<ConfusionNetwork, ConsensusError> {
        let first = self.processed == 0;
        let mut report = String::new();
        let opts = &self.options;

        if !opts.use_time_info {
            lat.set_no_time_info();
        }

        match lat.format() {
            LatticeFormat::Slf => {
                let formula = match self.formula {
                    Some(f) => f,
                    None => {
                        let f = opts.score_formula(lat);
                        let _ = writeln!(report, "\nFormula used for computing the link probabilities is: {f}");
                        let _ = writeln!(
                            report,
                            "where AC, LM and PR are the unscaled acoustic, language and pronunciation model scores"
                        );
                        if opts.lm_old_scale > 1.0 {
                            let _ = writeln!(
                                report,
                                "LM scores found in the lattice file were already weighted by {}",
                                format_g(opts.lm_old_scale)
                            );
                        }
                        if opts.pr_old_scale > 1.0 {
                            let _ = writeln!(
                                report,
                                "PM scores found in the lattice file were already  weighted by {}",
                                format_g(opts.pr_old_scale)
                            );
                        }
                        self.formula = Some(f);
                        f
                    }
                };
                if formula.pr_weight > 0.0 {
                    let uniform = lat.put_uniform_pron_prob(&self.prons);
                    if first {
                        let source = if uniform { "uniform" } else { "taken from the input file" };
                        let _ = writeln!(report, "\nPronunciation model: {source}");
                        let _ = writeln!(report, "Pronunciations file: {}\n", opts.pron_file.display());
                    }
                }
                lat.compute_link_scores(formula.lm_weight, formula.pr_weight, formula.wip, formula.scale);
            }
            LatticeFormat::Fsm => {
                let sign = if opts.scale < 0.0 { -1.0 } else { 1.0 };
                let wdpenalty = opts.wdpenalty.unwrap_or(0.0);
                if wdpenalty != 0.0 {
                    let _ = writeln!(report, "\nThe link scores were modified by WIP = {}", format_g(wdpenalty));
                    lat.add_wip(sign * wdpenalty);
                }
                let pr_weight = opts.pr_weight.unwrap_or(0.0);
                if pr_weight != 0.0 {
                    let _ = writeln!(
                        report,
                        "\nThe pronunciation probs were added to the link scores; PR weight = {}",
                        format_g(pr_weight)
                    );
                    lat.add_prons(&self.prons, sign * pr_weight);
                }
                if opts.scale != 1.0 {
                    lat.scale_link_scores(opts.scale);
                    let _ = writeln!(report, "\nThe link scores are scaled by: {}", format_g(opts.scale));
                }
            }
        }

        match opts.pruning {
            Pruning::Percentage(t) => {
                let _ = writeln!(report, "Keep {}% links", format_g(t));
            }
            Pruning::Score(t) => {
                let _ = writeln!(report, "Threshold: {}", format_g(t));
            }
            Pruning::None => {
                let _ = writeln!(report, "Threshold: none");
            }
        }
        report.push('\n');
        if opts.sausage_dir.is_some() {
            let b = &opts.bin_pruning;
            let _ = writeln!(
                report,
                "Thresholds used for pruning the bins in the confusion networks: lowEpsT({}), highEpsT({}), lowWordT({}), highWordT({})",
                format_g(b.low_eps),
                format_g(b.high_eps),
                format_g(b.low_word),
                format_g(b.high_word)
            );
        }
        if opts.del_weight != 1.0 {
            let _ = writeln!(report, "Weight of the deletion is:{}", format_g(opts.del_weight));
        }
        report.push('\n');
        let _ = writeln!(report, "Using time information : {}", flag(lat.has_time_info()));
        let _ = writeln!(report, "Using phon similarity  : {}\n", flag(opts.use_phon_info));

        lat.do_forward_backward()?;
        if !lat.has_time_info() {
            lat.put_max_dist(&self.prons);
        }
        opts.pruning.apply(lat);

        let mut clustering = Clustering::new(lat, &self.prons);
        clustering.go_cluster(lat, &self.prons, Stage::IntraWord, opts.intra, opts.constrain_intra);
        let _ = writeln!(report, "Intra-word Clustering method: {}", linkage_name(opts.intra));
        let _ = writeln!(report, "Constrain intra-word clustering: {}\n", flag(opts.constrain_intra));

        clustering.fill_words(lat);
        let stage = if opts.use_phon_info {
            Stage::Phonetic
        } else {
            Stage::Orthographic
        };
        clustering.go_cluster(lat, &self.prons, stage, opts.inter, opts.constrain_inter);
        let _ = writeln!(report, "Inter-word Clustering method: {}", linkage_name(opts.inter));
        let _ = writeln!(report, "Constrain inter-word clustering: {}\n", flag(opts.constrain_inter));

        // Constrained merging can stop short of a total order.
        if opts.constrain_inter {
            clustering.go_cluster(lat, &self.prons, Stage::TotalOrder, Linkage::Avg, false);
        }
        clustering.add_eps(lat, opts.del_weight);
        clustering.top_sort();
        debug!(bins = clustering.no_clusters(), words = clustering.no_words(lat), "clustered");

        if first {
            if let Some(log) = self.log.as_mut() {
                if let Some(path) = &self.options.log_file {
                    log.write_all(report.as_bytes()).map_err(io_err(path))?;
                    log.flush().map_err(io_err(path))?;
                }
            }
        }
        self.processed += 1;
        Ok(ConfusionNetwork::from_clustering(label, &clustering, &self.prons))
    }

    /// Write the consensus line, the sausage file and the JSON export.
    pub fn emit(&self, net: &ConfusionNetwork) -> Result<(), ConsensusError> {
        let line = net.consensus_line();
        match &self.options.consensus_file {
            Some(path) => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(io_err(path))?;
                writeln!(file, "{line}").map_err(io_err(path))?;
            }
            None => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                writeln!(out, "{line}").map_err(io_err(Path::new("<stdout>")))?;
            }
        }

        if let Some(dir) = &self.options.sausage_dir {
            let path = dir.join(format!("{}.saus", net.label));
            let file = File::create(&path).map_err(io_err(&path))?;
            let mut out = BufWriter::new(file);
            net.write_sausage(&mut out, &self.options.bin_pruning)
                .and_then(|_| out.flush())
                .map_err(io_err(&path))?;
        }

        if let Some(dir) = &self.options.json_dir {
            let path = dir.join(format!("{}.json", net.label));
            fs::write(&path, net.to_json()?).map_err(io_err(&path))?;
        }
        Ok(())
    }
}
