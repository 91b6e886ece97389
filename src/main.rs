use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use junction_traffic::{
    ArtifactBundle, CalendarPolicy, Classifier, DirectoryStore, Predictor, SystemClock,
    TrafficPrediction,
    config::AppConfig,
    history::{self, busiest_hours, hourly_level_counts},
    ml::{
        persistence::{MODEL, import_xgboost_dump},
        training::TrainingDataPreparer,
    },
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "junction-traffic")]
#[command(about = "Traffic-level prediction for road junctions")]
struct Args {
    /// Configuration file layered over the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Artifact directory (overrides configuration)
    #[arg(long, global = true)]
    artifacts: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict the traffic level at a junction (defaults to now)
    Predict {
        #[arg(long)]
        junction: String,
        /// Local date in the reference zone, YYYY-MM-DD
        #[arg(long, requires = "hour")]
        date: Option<NaiveDate>,
        #[arg(long, requires = "date")]
        hour: Option<u32>,
        #[arg(long, default_value_t = 0)]
        minute: u32,
        /// Include per-class probabilities
        #[arg(long)]
        probabilities: bool,
        /// Print the prediction as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the aligned feature vector the classifier would receive
    Features {
        #[arg(long)]
        junction: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        hour: u32,
        #[arg(long, default_value_t = 0)]
        minute: u32,
    },
    /// Build the feature contract and training matrix from a CSV dataset
    Prepare {
        #[arg(long)]
        input: PathBuf,
        /// Where to write the training matrix (default: <artifacts>/training_matrix.csv)
        #[arg(long)]
        matrix: Option<PathBuf>,
    },
    /// Convert an XGBoost multi:softprob dump into the model artifact
    ImportModel {
        /// Dump written by gbdt's convert_xgboost.py
        #[arg(long)]
        dump: PathBuf,
    },
    /// Summarise historical traffic levels by junction and hour
    History {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        junction: Option<String>,
        /// Level used to rank the busiest hours
        #[arg(long, default_value = "High")]
        level: String,
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    /// Load and cross-check the artifacts, then describe them
    Inspect,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("junction_traffic=debug");

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config =
        AppConfig::load_with(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = args.artifacts {
        config.artifacts.dir = dir;
    }

    match args.command {
        Command::Predict {
            junction,
            date,
            hour,
            minute,
            probabilities,
            json,
        } => {
            let predictor = load_predictor(&config)?;
            let with_probabilities = probabilities || config.inference.include_probabilities;

            let prediction = match (date, hour) {
                (Some(date), Some(hour)) => {
                    let time = predictor.observe_local(date, hour, minute)?;
                    predictor.predict(&time, &junction, with_probabilities)?
                }
                (None, None) => predictor.predict_now(&SystemClock, &junction, with_probabilities)?,
                _ => bail!("--date and --hour must be given together"),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            } else {
                print_prediction(&prediction);
            }
        }
        Command::Features {
            junction,
            date,
            hour,
            minute,
        } => {
            let predictor = load_predictor(&config)?;
            let time = predictor.observe_local(date, hour, minute)?;
            let values = predictor.features(&time, &junction)?;

            for (name, value) in predictor.schema().label(&values) {
                println!("{name:<32} {value}");
            }
        }
        Command::Prepare { input, matrix } => {
            let observations = history::load_observations(&input)
                .with_context(|| format!("Failed to read dataset {}", input.display()))?;

            let set = TrainingDataPreparer::new(
                CalendarPolicy::CANONICAL,
                config.timezone.utc_offset_minutes,
            )
            .prepare(&observations)?;

            let store = DirectoryStore::new(&config.artifacts.dir);
            set.save(&store).context("Failed to save feature contract")?;

            let matrix = matrix.unwrap_or_else(|| config.artifacts.dir.join("training_matrix.csv"));
            set.write_matrix_to_path(&matrix)?;

            println!(
                "Wrote contract for {} junctions and {} columns to {}",
                set.contract.vocabulary.junctions.len(),
                set.schema.len(),
                store.dir().display()
            );
            println!("Wrote {} training rows to {}", set.rows.len(), matrix.display());
        }
        Command::ImportModel { dump } => {
            let store = DirectoryStore::new(&config.artifacts.dir);
            let model = import_xgboost_dump(&store, &dump)
                .with_context(|| format!("Failed to import {}", dump.display()))?;

            println!(
                "Wrote {} to {}",
                model.describe(),
                store.path_for(MODEL).display()
            );
        }
        Command::History {
            input,
            junction,
            level,
            top,
        } => {
            let mut observations = history::load_observations(&input)
                .with_context(|| format!("Failed to read dataset {}", input.display()))?;
            if let Some(junction) = &junction {
                observations.retain(|o| &o.junction == junction);
            }

            let aggregates = hourly_level_counts(&observations);
            println!("{:<20} {:>4} {:>6} {:<8} {:>6}", "Junction", "Hour", "Rows", "Modal", level);
            for a in &aggregates {
                println!(
                    "{:<20} {:>4} {:>6} {:<8} {:>5.0}%",
                    a.junction,
                    a.hour,
                    a.total(),
                    a.modal_level().unwrap_or("-"),
                    a.share(&level) * 100.0
                );
            }

            println!();
            println!("Hours with the highest share of {level}:");
            for (junction, hour, share) in busiest_hours(&aggregates, &level, top) {
                println!("  {junction} at {hour:02}:00 ({:.0}%)", share * 100.0);
            }
        }
        Command::Inspect => {
            let store = DirectoryStore::new(&config.artifacts.dir);
            let bundle = ArtifactBundle::load(&store, config.load_options())
                .context("Artifacts failed validation")?;

            println!("{}", bundle.summary());
            for column in &bundle.report.dropped {
                println!("  dropped by schema: {column}");
            }
            for column in &bundle.report.always_zero {
                println!("  always zero:       {column}");
            }
        }
    }

    Ok(())
}

/// Artifacts are loaded once; failure here means nothing is served.
fn load_predictor(config: &AppConfig) -> Result<Predictor> {
    let store = DirectoryStore::new(&config.artifacts.dir);
    Predictor::load(&store, config.load_options()).with_context(|| {
        format!(
            "Failed to load artifacts from {}",
            config.artifacts.dir.display()
        )
    })
}

fn print_prediction(prediction: &TrafficPrediction) {
    println!(
        "{} at {}: {} traffic",
        prediction.junction,
        prediction.timestamp.format("%Y-%m-%d %H:%M %:z"),
        prediction.label
    );
    println!("Labels from: {}", prediction.label_policy);

    if let Some(probabilities) = &prediction.probabilities {
        for p in probabilities {
            println!("  {:<8} {:>5.1}%", p.label, p.probability * 100.0);
        }
    }
}
