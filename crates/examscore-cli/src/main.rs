//! examscore CLI: validate content, grade sessions, compare reports.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "examscore", version, about = "Certification exam grading engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check content fixtures for defects
    Validate {
        /// Path to a content fixture or directory
        #[arg(long)]
        content: PathBuf,

        /// Also write defects as SARIF to this file
        #[arg(long)]
        sarif: Option<PathBuf>,
    },

    /// Grade a session of submissions
    Grade {
        /// Path to a content fixture or directory
        #[arg(long)]
        content: PathBuf,

        /// Session JSON file with the submissions to grade
        #[arg(long)]
        submissions: PathBuf,

        /// Output directory (defaults to the configured output_dir)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: json, html, all
        #[arg(long, default_value = "json")]
        format: String,

        /// Judge for free-text essays (defaults to the configured default_judge)
        #[arg(long)]
        judge: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compare two exam reports
    Compare {
        /// Baseline report JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current report JSON
        #[arg(long)]
        current: PathBuf,

        /// Change in an area's fraction that counts as a decline or improvement
        #[arg(long, default_value = "0.05")]
        threshold: f64,

        /// Exit code 1 if any area declined
        #[arg(long)]
        fail_on_decline: bool,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Create starter config, sample content, and a sample session
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "examscore=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { content, sarif } => commands::validate::execute(content, sarif),
        Commands::Grade {
            content,
            submissions,
            output,
            format,
            judge,
            config,
        } => commands::grade::execute(content, submissions, output, format, judge, config).await,
        Commands::Compare {
            baseline,
            current,
            threshold,
            fail_on_decline,
            format,
        } => commands::compare::execute(baseline, current, threshold, fail_on_decline, format),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
