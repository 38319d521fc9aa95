use std::fs;
use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::Parser;

use clp_engine::clustering::Linkage;
use clp_engine::lattice::LatticeFormat;
use clp_engine::pipeline::{Consensus, ConsensusError, ConsensusOptions, Pruning};
use clp_engine::sausage::BinPruning;
use clp_engine::{settings, trace_init};

#[derive(Parser)]
#[command(name = "consensus", about = "Confusion networks and consensus hypotheses from word lattices")]
struct Cli {
    /// File listing the lattices to process, one path per line
    #[arg(short = 'i', long = "input")]
    input: PathBuf,
    /// Append consensus hypotheses to this file instead of stdout
    #[arg(short = 'c', long = "consensus")]
    consensus: Option<PathBuf>,
    /// Directory for the confusion networks (`<label>.saus`)
    #[arg(short = 'C', long = "sausage-dir")]
    sausage_dir: Option<PathBuf>,
    /// Pronunciation dictionary
    #[arg(short = 'R', long = "prons")]
    prons: PathBuf,
    /// Write the parameter report here
    #[arg(short = 'G', long = "log")]
    log: Option<PathBuf>,
    /// Posterior scale
    #[arg(short = 'S', long = "scale", default_value = "1", allow_negative_numbers = true)]
    scale: f64,
    /// LM weight (default: the lattice's lmscale, or 1)
    #[arg(short = 'L', long = "lm-weight")]
    lm_weight: Option<f64>,
    /// Weight already applied to the LM scores in the lattices
    #[arg(short = 'l', long = "lm-old-scale", default_value = "0")]
    lm_old_scale: f64,
    /// Pronunciation weight (default: the lattice's prscale, or 1)
    #[arg(short = 'P', long = "pr-weight")]
    pr_weight: Option<f64>,
    /// Weight already applied to the pronunciation scores in the lattices
    #[arg(short = 'p', long = "pr-old-scale", default_value = "0")]
    pr_old_scale: f64,
    /// Word insertion penalty (default: the lattice's wdpenalty)
    #[arg(short = 'I', long = "wdpenalty", allow_negative_numbers = true)]
    wdpenalty: Option<f64>,
    /// Weight of the deletion entries
    #[arg(short = 'D', long = "del-weight", default_value = "1")]
    del_weight: f64,
    /// Prune links whose posterior is this factor below the total
    #[arg(short = 'T', long = "score-threshold")]
    score_threshold: Option<f64>,
    /// Keep only this percentage of the links
    #[arg(short = 't', long = "percentage")]
    percentage: Option<f64>,
    /// Intra-word clustering method: max or avg
    #[arg(short = 'm', long = "intra", default_value = "max")]
    intra: Linkage,
    /// Inter-word clustering method: max or avg
    #[arg(short = 'M', long = "inter", default_value = "max")]
    inter: Linkage,
    /// Drop a non-best deletion scoring at or below this
    #[arg(short = 'e', long = "low-eps", default_value = "0")]
    low_eps: f64,
    /// Drop a bin whose best entry is a deletion scoring above this
    #[arg(short = 'E', long = "high-eps", default_value = "1")]
    high_eps: f64,
    /// Drop non-best words scoring at or below this
    #[arg(short = 'w', long = "low-word", default_value = "0")]
    low_word: f64,
    /// Keep only the best word when it scores above this
    #[arg(short = 'W', long = "high-word", default_value = "1")]
    high_word: f64,
    /// Lattices are in FSM format instead of SLF
    #[arg(short = 'f', long = "fsm")]
    fsm: bool,
    /// Ignore the time information in the lattices
    #[arg(short = 'o', long = "no-time")]
    no_time: bool,
    /// Ignore phonetic similarity when clustering different words
    #[arg(short = 's', long = "no-phon")]
    no_phon: bool,
    /// Constrain intra-word clustering
    #[arg(short = 'b', long = "constrain-intra")]
    constrain_intra: bool,
    /// Constrain inter-word clustering
    #[arg(short = 'n', long = "constrain-inter")]
    constrain_inter: bool,
    /// TOML file overriding the clustering tunables
    #[arg(long)]
    config: Option<PathBuf>,
    /// Also write each confusion network as `<dir>/<label>.json`
    #[arg(long)]
    json: Option<PathBuf>,
    /// Write JSON trace output here (needs the `trace` feature)
    #[arg(long)]
    trace_dir: Option<PathBuf>,
}

impl Cli {
    fn options(&self) -> ConsensusOptions {
        ConsensusOptions {
            format: if self.fsm {
                LatticeFormat::Fsm
            } else {
                LatticeFormat::Slf
            },
            pron_file: self.prons.clone(),
            consensus_file: self.consensus.clone(),
            sausage_dir: self.sausage_dir.clone(),
            json_dir: self.json.clone(),
            log_file: self.log.clone(),
            scale: self.scale,
            lm_weight: self.lm_weight,
            lm_old_scale: self.lm_old_scale,
            pr_weight: self.pr_weight,
            pr_old_scale: self.pr_old_scale,
            wdpenalty: self.wdpenalty,
            del_weight: self.del_weight,
            pruning: Pruning::resolve(self.score_threshold, self.percentage),
            intra: self.intra,
            inter: self.inter,
            constrain_intra: self.constrain_intra,
            constrain_inter: self.constrain_inter,
            use_time_info: !self.no_time,
            use_phon_info: !self.no_phon,
            bin_pruning: BinPruning {
                low_eps: self.low_eps,
                high_eps: self.high_eps,
                low_word: self.low_word,
                high_word: self.high_word,
            },
        }
    }
}

fn run(cli: &Cli) -> Result<usize, ConsensusError> {
    if let Some(path) = &cli.config {
        let text = fs::read_to_string(path).map_err(|source| ConsensusError::Io {
            path: path.clone(),
            source,
        })?;
        settings::init_custom(text)?;
    }
    let mut consensus = Consensus::new(cli.options())?;
    consensus.process_list(&cli.input)
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    };
    trace_init::init_tracing(cli.trace_dir.as_deref());

    if let Err(e) = run(&cli) {
        eprintln!("consensus: {e}");
        process::exit(1);
    }
}
