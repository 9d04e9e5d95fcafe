use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Train and run cached domain and intent classifiers over a project
/// directory.
#[derive(Parser, Debug)]
#[command(name = "intentkit", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit a classifier, reusing the previous artifact when nothing changed
    Fit(FitArgs),
    /// Classify a query with a trained artifact
    Predict(PredictArgs),
    /// Evaluate a trained artifact against a labeled set
    Evaluate(EvaluateArgs),
    /// Print the cache digest a fit would produce
    Hash(HashArgs),
    /// Print the training examples grouped by domain and intent
    Tree(TreeArgs),
}

#[derive(Args, Debug, Clone)]
struct Target {
    /// Project directory with `domains/`, `entities/` and `word_freq.txt`
    #[arg(long, env = "INTENTKIT_PROJECT")]
    project: PathBuf,

    /// Train an intent classifier for this domain instead of the domain
    /// classifier
    #[arg(long)]
    domain: Option<String>,
}

#[derive(Args, Debug)]
struct FitArgs {
    #[command(flatten)]
    target: Target,

    /// Artifact path; its `.hash` sidecar is written alongside
    #[arg(long)]
    model: PathBuf,

    /// JSON classifier configuration merged onto the defaults
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "train")]
    label_set: String,

    /// Refit even when the cache digest matches
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct PredictArgs {
    #[command(flatten)]
    target: Target,

    #[arg(long)]
    model: PathBuf,

    /// Print every label's probability as JSON
    #[arg(long)]
    proba: bool,

    text: String,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    #[command(flatten)]
    target: Target,

    #[arg(long)]
    model: PathBuf,

    #[arg(long, default_value = "test")]
    label_set: String,
}

#[derive(Args, Debug)]
struct HashArgs {
    #[command(flatten)]
    target: Target,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "train")]
    label_set: String,
}

#[derive(Args, Debug)]
struct TreeArgs {
    #[command(flatten)]
    target: Target,

    #[arg(long, default_value = "train")]
    label_set: String,

    /// Render examples as markup strings
    #[arg(long)]
    raw: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!(?cli, "intentkit v{}", env!("CARGO_PKG_VERSION"));

    let output = match cli.command {
        Command::Fit(args) => commands::fit(&args)?,
        Command::Predict(args) => commands::predict(&args)?,
        Command::Evaluate(args) => commands::evaluate(&args)?,
        Command::Hash(args) => commands::hash(&args)?,
        Command::Tree(args) => commands::tree(&args)?,
    };
    println!("{output}");
    Ok(())
}
