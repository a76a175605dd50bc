use anyhow::{bail, Context};
use clap::Parser;
use crystal_graph::config::{Config, GaussianConfig};
use crystal_graph::graph::{CrystalGraphDisordered, CrystalPro, NnStrategy};
use crystal_graph::io;
use crystal_graph::utils::logger;
use log::LevelFilter;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

/// Convert a crystal structure (CIF or POSCAR) into graph input arrays, printed as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Structure file; `.cif` is read as CIF, anything else as POSCAR
    structure: PathBuf,

    #[arg(long)]
    cutoff: Option<f64>,

    /// MinimumDistanceNNAll | MinimumDistanceNN | AllAtomPairs
    #[arg(long)]
    strategy: Option<String>,

    /// Blend element embeddings over partially occupied sites
    #[arg(long)]
    disordered: bool,

    /// JSON file of element embeddings (implies --disordered)
    #[arg(long)]
    embeddings: Option<PathBuf>,

    /// Expand distances on N Gaussian centers
    #[arg(long)]
    gaussian: Option<usize>,

    #[arg(long)]
    gaussian_width: Option<f64>,

    /// Settings file; defaults to the per-user settings.json
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit the unconverted graph (atoms, distances, indices)
    #[arg(long)]
    raw: bool,

    #[arg(short, long)]
    output: Option<PathBuf>,

    /// -v info, -vv debug, -vvv trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply(&self, cfg: &mut Config) -> anyhow::Result<()> {
        if let Some(cutoff) = self.cutoff {
            cfg.cutoff = cutoff;
        }
        if let Some(name) = &self.strategy {
            cfg.strategy = NnStrategy::from_str(name)
                .map_err(|_| crystal_graph::GraphError::UnknownStrategy(name.clone()))?;
        }
        if self.disordered || self.embeddings.is_some() {
            cfg.disordered = true;
        }
        if let Some(path) = &self.embeddings {
            cfg.embeddings = Some(path.clone());
        }
        if self.gaussian.is_some() || self.gaussian_width.is_some() {
            let mut gaussian = cfg.gaussian.clone().unwrap_or_default();
            if let Some(n) = self.gaussian {
                gaussian.centers = n;
            }
            if let Some(width) = self.gaussian_width {
                gaussian.width = width;
            }
            cfg.gaussian = Some(gaussian);
        }
        Ok(())
    }

    fn log_level(&self, cfg: &Config) -> LevelFilter {
        match self.verbose {
            0 => logger::parse_level(&cfg.log_level).unwrap_or(LevelFilter::Warn),
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut cfg, config_msg) = match &cli.config {
        Some(path) => {
            let cfg = Config::load_from(path).with_context(|| format!("reading config {}", path.display()))?;
            (cfg, format!("Config loaded from {:?}", path))
        }
        None => Config::load(),
    };
    cli.apply(&mut cfg)?;

    let _ = logger::init(cli.log_level(&cfg));
    log::info!("{}", config_msg);

    let structure = io::load_structure(&cli.structure)
        .with_context(|| format!("loading structure {}", cli.structure.display()))?;

    let value = if cfg.disordered {
        let Some(path) = &cfg.embeddings else {
            bail!("disordered mode needs an embeddings file (--embeddings or \"embeddings\" in the config)");
        };
        let table = io::load_embeddings(path)?;
        let mut graph = CrystalGraphDisordered::default()
            .with_strategy(cfg.strategy.build())
            .with_cutoff(cfg.cutoff)
            .with_embeddings(table);
        if let Some(gaussian) = &cfg.gaussian {
            graph = graph.with_bond_converter(build_gaussian(gaussian)?);
        }

        if cli.raw {
            serde_json::to_value(graph.convert(&structure, None)?)?
        } else {
            serde_json::to_value(graph.get_input(&structure, None)?)?
        }
    } else {
        let mut graph = CrystalPro::default()
            .with_strategy(cfg.strategy.build())
            .with_cutoff(cfg.cutoff);
        if let Some(gaussian) = &cfg.gaussian {
            graph = graph.with_bond_converter(build_gaussian(gaussian)?);
        }

        if cli.raw {
            serde_json::to_value(graph.convert(&structure, None)?)?
        } else {
            serde_json::to_value(graph.get_input(&structure, None)?)?
        }
    };

    match &cli.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &value)?;
            writer.flush()?;
            log::info!("Graph written to {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, &value)?;
            writeln!(writer)?;
        }
    }

    Ok(())
}

fn build_gaussian(gaussian: &GaussianConfig) -> anyhow::Result<crystal_graph::GaussianDistance> {
    gaussian
        .build()
        .with_context(|| format!("building Gaussian basis from {:?}", gaussian))
}
