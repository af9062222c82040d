//! StackGuard service and operator CLI.
//!
//! ```text
//! stackguard serve    [--config PATH]
//! stackguard predict  [--config PATH] TEXT
//! stackguard evaluate [--config PATH] --dataset PATH [--json]
//! stackguard fit-meta [--config PATH] --dataset PATH --output PATH
//! ```
//!
//! The configuration file is taken from `--config`, then the
//! `STACKGUARD_CONFIG` environment variable, then built-in defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use stackguard_core::{LoggingConfig, ServiceConfig, StackGuardError};
use stackguard_model::dataset::split_samples;
use stackguard_model::{
    ClassificationReport, Classifier, DatasetLoader, StackingEnsemble, TfidfEncoder,
};
use stackguard_server::config::{resolve_config, CONFIG_ENV};
use stackguard_server::{build_router, serve_until_shutdown, AppState, ShutdownCoordinator};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackguard", about = "SQLi / XSS stacking-ensemble classifier")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP service.
    Serve,
    /// Classify a single text and print the label.
    Predict {
        /// Text to classify.
        text: String,
    },
    /// Score the loaded models on a labelled dataset.
    Evaluate {
        /// JSON array of `{"text", "label"}` samples.
        #[arg(long)]
        dataset: PathBuf,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Refit the meta-model on a labelled dataset and write a new ensemble.
    FitMeta {
        /// JSON array of `{"text", "label"}` samples.
        #[arg(long)]
        dataset: PathBuf,
        /// Where to write the refitted ensemble artifact.
        #[arg(long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let config = resolve_config(cli.config, env_path)?;
    init_logging(&config.logging)?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Predict { text } => predict(&config, &text),
        Command::Evaluate { dataset, json } => evaluate(&config, &dataset, json),
        Command::FitMeta { dataset, output } => fit_meta(&config, &dataset, &output),
    }
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// configured level. Logs go to stderr so command output stays clean.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialise logging: {e}"))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    info!(
        listen_addr = %config.listen_addr,
        encoder = %config.model.encoder_path,
        ensemble = %config.model.ensemble_path,
        "Starting StackGuard"
    );

    // Refuse to bind with partially loaded models.
    let classifier = Classifier::load(&config.model, &config.guardrail)
        .context("Failed to load classifier")?;

    let shutdown = ShutdownCoordinator::new(config.shutdown.timeout_seconds);
    let state = Arc::new(AppState::new(classifier, shutdown.clone()));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(listen_addr = %config.listen_addr, "StackGuard listening");

    serve_until_shutdown(listener, app, shutdown).await?;
    info!("Shutdown complete");
    Ok(())
}

fn predict(config: &ServiceConfig, text: &str) -> anyhow::Result<()> {
    if text.is_empty() {
        anyhow::bail!("Text must not be empty");
    }
    let classifier = Classifier::load(&config.model, &config.guardrail)?;
    let verdict = classifier.classify(text)?;
    if verdict.overridden {
        println!("{} (raw: {})", verdict.label, verdict.raw);
    } else {
        println!("{}", verdict.label);
    }
    Ok(())
}

fn evaluate(config: &ServiceConfig, dataset: &Path, json: bool) -> anyhow::Result<()> {
    let classifier = Classifier::load(&config.model, &config.guardrail)?;
    let samples = DatasetLoader::load_from_file(dataset)?;
    let (texts, labels) = split_samples(&samples);

    let encoded = classifier.encoder().encode_batch(&texts);
    let ensemble = classifier.ensemble().evaluate(&encoded, &labels)?;

    let final_labels = texts
        .iter()
        .map(|t| classifier.classify(t).map(|v| v.label))
        .collect::<Result<Vec<_>, StackGuardError>>()?;
    let guarded = ClassificationReport::from_predictions(&labels, &final_labels);

    if json {
        let body = serde_json::json!({
            "ensemble": ensemble,
            "with_guardrail": guarded,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("Ensemble accuracy: {:.4}\n", ensemble.accuracy);
        println!("{}", ensemble.report);
        println!("With guardrail accuracy: {:.4}\n", guarded.accuracy);
        println!("{guarded}");
    }
    Ok(())
}

fn fit_meta(config: &ServiceConfig, dataset: &Path, output: &Path) -> anyhow::Result<()> {
    let encoder = TfidfEncoder::load(Path::new(&config.model.encoder_path))?;
    let mut ensemble = StackingEnsemble::load(Path::new(&config.model.ensemble_path))?;
    if encoder.dimension() != ensemble.n_features() {
        return Err(StackGuardError::shape_mismatch(
            "encoder dimension vs ensemble input",
            ensemble.n_features(),
            encoder.dimension(),
        )
        .into());
    }

    let samples = DatasetLoader::load_from_file(dataset)?;
    let (texts, labels) = split_samples(&samples);
    let encoded = encoder.encode_batch(&texts);

    ensemble.fit(&encoded, &labels)?;
    let evaluation = ensemble.evaluate(&encoded, &labels)?;
    info!(
        samples = samples.len(),
        accuracy = evaluation.accuracy,
        "Meta-model refitted"
    );

    ensemble.save(output)?;
    println!(
        "Wrote {} (training accuracy {:.4})",
        output.display(),
        evaluation.accuracy
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_predict_with_config() {
        let cli = Cli::try_parse_from(["stackguard", "predict", "--config", "c.yaml", "hello"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.yaml")));
        match cli.command {
            Command::Predict { text } => assert_eq!(text, "hello"),
            _ => panic!("expected predict"),
        }
    }

    #[test]
    fn test_parse_fit_meta_requires_output() {
        assert!(Cli::try_parse_from(["stackguard", "fit-meta", "--dataset", "d.json"]).is_err());
        let cli = Cli::try_parse_from([
            "stackguard",
            "fit-meta",
            "--dataset",
            "d.json",
            "--output",
            "out.json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::FitMeta { .. }));
    }

    #[test]
    fn test_parse_evaluate_json_flag() {
        let cli =
            Cli::try_parse_from(["stackguard", "evaluate", "--dataset", "d.json", "--json"])
                .unwrap();
        match cli.command {
            Command::Evaluate { json, .. } => assert!(json),
            _ => panic!("expected evaluate"),
        }
    }
}
