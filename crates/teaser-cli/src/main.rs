use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use teaser_contracts::config::EngineConfig;
use teaser_contracts::events::EventWriter;
use teaser_engine::TeaserEngine;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "teaser", version, about = "Deck-content generation over a local model server")]
struct Cli {
    /// Output directory for images and the event log.
    #[arg(long, default_value = "out")]
    out: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check whether the configured model is served locally.
    Probe,
    /// Free-form text generation with fallback.
    Generate(GenerateArgs),
    /// Investment narrative of a given kind.
    Narrative(NarrativeArgs),
    /// Anonymize company-specific text for a blind teaser.
    Anonymize(AnonymizeArgs),
    /// Extract structured research fields from scraped content.
    Research(ResearchArgs),
    /// Sector slide imagery (model-backed or placeholder).
    Image(ImageArgs),
    /// Describe an image through the model.
    Analyze(AnalyzeArgs),
    /// Render a bar/pie/line chart from inline JSON data.
    Chart(ChartArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    max_tokens: Option<u32>,
}

#[derive(Debug, Parser)]
struct NarrativeArgs {
    #[arg(long)]
    sector: String,
    #[arg(long)]
    context: String,
    #[arg(long, default_value = "business_overview")]
    kind: String,
}

#[derive(Debug, Parser)]
struct AnonymizeArgs {
    #[arg(long)]
    text: String,
    #[arg(long)]
    company: String,
    #[arg(long)]
    sector: String,
}

#[derive(Debug, Parser)]
struct ResearchArgs {
    #[arg(long)]
    query: String,
    /// Path to a file holding the scraped content.
    #[arg(long)]
    content: PathBuf,
    #[arg(long)]
    max_length: Option<u32>,
}

#[derive(Debug, Parser)]
struct ImageArgs {
    #[arg(long)]
    sector: String,
    #[arg(long = "type", default_value = "abstract")]
    image_type: String,
    /// Generate a batch of `count` images instead of a single one.
    #[arg(long)]
    count: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long)]
    path: PathBuf,
}

#[derive(Debug, Parser)]
struct ChartArgs {
    #[arg(long)]
    chart_type: String,
    /// Inline JSON object with the chart's data keys.
    #[arg(long, default_value = "{}")]
    data_json: String,
    #[arg(long, default_value = "")]
    title: String,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("teaser error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let engine = build_engine(&cli.out)?;

    match cli.command {
        Command::Probe => {
            if engine.is_available() {
                println!("model available at {}", engine.config().base_url);
            } else {
                println!("model unavailable; fallbacks will answer");
            }
        }
        Command::Generate(args) => {
            let text = engine.generate_text(&args.prompt, args.temperature, args.max_tokens);
            println!("{text}");
        }
        Command::Narrative(args) => {
            let text = engine.generate_narrative(&args.context, &args.sector, &args.kind);
            println!("{text}");
        }
        Command::Anonymize(args) => {
            let text = engine.anonymize_text(&args.text, &args.company, &args.sector);
            println!("{text}");
        }
        Command::Research(args) => {
            let content = fs::read_to_string(&args.content)
                .with_context(|| format!("failed reading {}", args.content.display()))?;
            let summary = engine.synthesize_research(&content, &args.query, args.max_length);
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Image(args) => match args.count {
            Some(count) => {
                for path in engine.generate_sector_images(&args.sector, count) {
                    println!("{}", path.display());
                }
            }
            None => {
                let path =
                    engine.generate_sector_image(&args.sector, &args.image_type, args.seed)?;
                println!("{}", path.display());
            }
        },
        Command::Analyze(args) => {
            println!("{}", engine.analyze_image(&args.path));
        }
        Command::Chart(args) => {
            let data = parse_chart_data(&args.data_json)?;
            match engine.generate_chart_image(&args.chart_type, &data, &args.title) {
                Some(path) => println!("{}", path.display()),
                None => {
                    println!("chart rendering failed");
                    return Ok(1);
                }
            }
        }
    }

    Ok(0)
}

fn build_engine(out: &Path) -> Result<TeaserEngine> {
    let mut config = EngineConfig::from_env();
    config.output_dir = out.join("generated_images");
    let events = EventWriter::new(out.join("events.jsonl"), Uuid::new_v4().to_string());
    TeaserEngine::new(config, events)
}

fn parse_chart_data(raw: &str) -> Result<Map<String, Value>> {
    let parsed: Value =
        serde_json::from_str(raw).context("--data-json is not valid JSON")?;
    Ok(parsed.as_object().cloned().unwrap_or_default())
}
