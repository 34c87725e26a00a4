//! PCR Simulator - In-Silico Amplification Tool
//!
//! Reads templates from FASTA and a reaction description from JSON, runs
//! the cycle simulation and prints a JSON report with bands, gel lanes,
//! fluorescence and melting curves.

use std::fs;
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use serde::{Deserialize, Serialize};

use pcrsim::{
    gel_lanes, read_template_fasta, BandData, CycleProgress, GelLane, Ingredient, MeltingPoint,
    Pcr, PcrParams, PrimerSearcher, Solution, Strand,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "pcrsim", version, about = "In-silico PCR amplification")]
struct Args {
    /// Template sequences (FASTA); the first header word is the template id
    #[arg(long, value_name = "FASTA")]
    templates: PathBuf,

    /// Reaction mixture (JSON)
    #[arg(long, value_name = "JSON")]
    reaction: PathBuf,

    /// Simulation parameters (JSON); missing fields take defaults
    #[arg(long, value_name = "JSON")]
    params: Option<PathBuf>,

    /// Alignment cache snapshot to pre-warm the primer search
    #[arg(long, value_name = "JSON")]
    cache: Option<PathBuf>,

    /// Write the alignment cache here after the run
    #[arg(long, value_name = "PATH")]
    export_cache: Option<PathBuf>,

    #[arg(long)]
    cycles: Option<usize>,

    /// Annealing temperature in °C
    #[arg(long)]
    annealing_temp: Option<f64>,

    /// Denaturation temperature in °C
    #[arg(long)]
    denaturation_temp: Option<f64>,

    /// Volume loaded on the gel, in µl
    #[arg(long, default_value_t = 10.0)]
    sample_volume: f64,

    /// Print every alignment found to stderr
    #[arg(long)]
    show_alignments: bool,
}

#[derive(Deserialize, Debug)]
struct ReactionFile {
    #[serde(default = "default_reaction_id")]
    id: String,
    /// µl
    volume: f64,
    #[serde(default = "default_polymerase_activity")]
    polymerase_activity: f64,
    #[serde(default)]
    templates: Vec<TemplateEntry>,
    #[serde(default)]
    primers: Vec<PrimerEntry>,
}

#[derive(Deserialize, Debug)]
struct TemplateEntry {
    id: String,
    /// pmol
    quantity: f64,
}

#[derive(Deserialize, Debug)]
struct PrimerEntry {
    #[serde(default)]
    id: Option<String>,
    sequence: String,
    /// pmol
    quantity: f64,
}

fn default_reaction_id() -> String {
    "reaction".to_string()
}

fn default_polymerase_activity() -> f64 {
    100.0
}

#[derive(Serialize)]
struct ProductSummary {
    id: usize,
    template_id: String,
    size: usize,
    template_begin: usize,
    template_end: usize,
    forward_primer: String,
    reverse_primer: String,
}

#[derive(Serialize)]
struct Report {
    products: Vec<ProductSummary>,
    bands: Vec<BandData>,
    gel: Vec<GelLane>,
    fluorescence: Vec<f64>,
    melting_curves: Vec<Vec<MeltingPoint>>,
}

fn load_params(args: &Args) -> Result<PcrParams> {
    let mut params = match &args.params {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading parameters {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing parameters {}", path.display()))?
        }
        None => PcrParams::default(),
    };
    if let Some(cycles) = args.cycles {
        params.cycles = cycles;
    }
    if let Some(t) = args.annealing_temp {
        params.annealing_temp = t;
    }
    if let Some(t) = args.denaturation_temp {
        params.denaturation_temp = t;
    }
    Ok(params)
}

fn build_solution(args: &Args) -> Result<Solution> {
    let registry = read_template_fasta(&args.templates)
        .with_context(|| format!("reading templates {}", args.templates.display()))?;
    let text = fs::read_to_string(&args.reaction)
        .with_context(|| format!("reading reaction {}", args.reaction.display()))?;
    let reaction: ReactionFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing reaction {}", args.reaction.display()))?;

    let mut solution = Solution::new(&reaction.id, reaction.volume);
    solution.set_dna_polymerase_activity(reaction.polymerase_activity);
    for entry in &reaction.templates {
        let template = registry
            .ingredient(&entry.id)
            .with_context(|| format!("template {} is not in {}", entry.id, args.templates.display()))?;
        solution.add_ingredient(template, entry.quantity);
    }
    for entry in &reaction.primers {
        let primer = match &entry.id {
            Some(id) => Ingredient::named_primer(id, &entry.sequence),
            None => Ingredient::primer(&entry.sequence),
        }
        .with_context(|| format!("primer {}", entry.sequence))?;
        solution.add_ingredient(primer, entry.quantity);
    }
    Ok(solution)
}

fn print_alignments(pcr: &Pcr, searcher: &mut PrimerSearcher) -> Result<()> {
    let solution = pcr.solution();
    for template in solution.templates() {
        for primer in solution.primers() {
            for strand in Strand::BOTH {
                let found = searcher.search_primer(
                    template.ingredient.id(),
                    template.ingredient.sequence(),
                    primer.ingredient.sequence(),
                    strand,
                    pcr.params().fudge,
                )?;
                eprintln!(
                    "# {} / {} / {}",
                    template.ingredient.id(),
                    primer.ingredient.id(),
                    strand
                );
                eprintln!("{}", found.as_text());
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let params = load_params(&args)?;
    let solution = build_solution(&args)?;
    let sample_name = solution.id.clone();

    let mut searcher =
        PrimerSearcher::with_scoring(Default::default(), params.max_alternatives_per_cell);
    if let Some(path) = &args.cache {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading cache {}", path.display()))?;
        let loaded = searcher
            .load_cache_json(&text)
            .with_context(|| format!("loading cache {}", path.display()))?;
        log::info!("Loaded {} cached searches from {}", loaded, path.display());
    }

    let mut pcr = Pcr::new(solution, params);
    let (tx, rx) = mpsc::channel::<CycleProgress>();
    let reporter = std::thread::spawn(move || {
        for update in rx {
            log::debug!(
                "{} (polymerase {:.1}%)",
                update.message,
                update.polymerase_activity
            );
        }
    });
    pcr.run_with_progress(&mut searcher, Some(&tx))?;
    drop(tx);
    reporter
        .join()
        .map_err(|_| anyhow::anyhow!("progress reporter panicked"))?;

    if args.show_alignments {
        print_alignments(&pcr, &mut searcher)?;
    }

    if let Some(path) = &args.export_cache {
        fs::write(path, searcher.export_cache_json()?)
            .with_context(|| format!("writing cache {}", path.display()))?;
        log::info!("Wrote {} cached searches to {}", searcher.cache_len(), path.display());
    }

    let bands = pcr.band_data(args.sample_volume);
    let report = Report {
        products: pcr
            .products()
            .iter()
            .map(|p| ProductSummary {
                id: p.id,
                template_id: p.template_id.clone(),
                size: p.size(),
                template_begin: p.forward.alignment.template_begin,
                template_end: p.reverse.alignment.template_end,
                forward_primer: p.forward.primer.id().to_string(),
                reverse_primer: p.reverse.primer.id().to_string(),
            })
            .collect(),
        gel: gel_lanes(&[(sample_name, bands.clone())]),
        bands,
        fluorescence: pcr.fluorescence_history(),
        melting_curves: pcr.melting_curves(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
