//! CLI command implementations
//!
//! Business logic for the `sondear` binary, extracted from main.rs for
//! testability. Presentation only: every command drives the library and
//! renders the structured record sequences it returns.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::corpus::{BookSource, Corpus, CorpusProvider, BOOKS};
use crate::error::{Result, SondearError};
use crate::harness::{self, NiahConfig, SurveyConfig};
use crate::probe::{ErrorPolicy, ProbeOutcome, ScalingConfig, ScalingProbe};
use crate::transport::HttpTransport;

/// Long-context probing harness for OpenAI-compatible endpoints
#[derive(Debug, Parser)]
#[command(name = "sondear", version, about)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Endpoint connection options shared by all probing commands
#[derive(Debug, Args)]
pub struct EndpointArgs {
    /// Base URL of the endpoint (e.g. http://localhost:8000)
    #[arg(long)]
    pub url: String,

    /// Model identifier to send
    #[arg(long, default_value = "default")]
    pub model: String,

    /// Bearer API key, when the endpoint requires one
    #[arg(long)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,
}

impl EndpointArgs {
    fn transport(&self) -> HttpTransport {
        let transport = HttpTransport::with_timeout(&self.url, self.timeout);
        match &self.api_key {
            Some(key) => transport.with_api_key(key),
            None => transport,
        }
    }
}

/// Corpus selection options
#[derive(Debug, Args)]
pub struct CorpusArgs {
    /// Registered book key (see `sondear books`)
    #[arg(long, default_value = "moby_dick", conflicts_with = "path")]
    pub book: String,

    /// Local text file to use instead of a registered book
    #[arg(long)]
    pub path: Option<PathBuf>,
}

impl CorpusArgs {
    fn load(&self) -> Result<Corpus> {
        let provider = CorpusProvider::new();
        match &self.path {
            Some(path) => provider.fetch_path(path),
            None => {
                let book = BookSource::by_key(&self.book).ok_or_else(|| {
                    SondearError::InvalidInput(format!("unknown book key '{}'", self.book))
                })?;
                provider.fetch_book(book)
            },
        }
    }
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Needle-in-a-haystack retrieval over a long document
    Niah {
        /// Endpoint options
        #[command(flatten)]
        endpoint: EndpointArgs,

        /// Corpus options
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Relative insertion positions in [0, 1]
        #[arg(long, value_delimiter = ',', default_values_t = [0.1, 0.5, 0.9])]
        fractions: Vec<f64>,

        /// RNG seed for reproducible needle selection
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Truncate the haystack to this many estimated tokens
        #[arg(long)]
        budget_tokens: Option<usize>,

        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Escalate synthesized input size until the endpoint signals a limit
    Scaling {
        /// Endpoint options
        #[command(flatten)]
        endpoint: EndpointArgs,

        /// Ascending target sizes in estimated tokens
        #[arg(long, value_delimiter = ',')]
        sizes: Option<Vec<usize>>,

        /// Keep probing after generic (non-context-limit) transport errors
        #[arg(long)]
        continue_on_error: bool,

        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Summarization and comprehension battery over a corpus slice
    Survey {
        /// Endpoint options
        #[command(flatten)]
        endpoint: EndpointArgs,

        /// Corpus options
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Corpus slice budget in estimated tokens
        #[arg(long, default_value_t = 30_000)]
        budget_tokens: usize,

        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// List the registered public-domain books
    Books,
}

/// Main CLI entrypoint, dispatching commands to handlers
///
/// # Errors
/// Propagates configuration and corpus errors; per-trial transport failures
/// are recorded in the output instead.
pub fn entrypoint(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Niah {
            endpoint,
            corpus,
            fractions,
            seed,
            budget_tokens,
            format,
        } => handle_niah(&endpoint, &corpus, fractions, seed, budget_tokens, &format),
        Commands::Scaling {
            endpoint,
            sizes,
            continue_on_error,
            format,
        } => handle_scaling(&endpoint, sizes, continue_on_error, &format),
        Commands::Survey {
            endpoint,
            corpus,
            budget_tokens,
            format,
        } => handle_survey(&endpoint, &corpus, budget_tokens, &format),
        Commands::Books => {
            handle_books();
            Ok(())
        },
    }
}

fn handle_niah(
    endpoint: &EndpointArgs,
    corpus_args: &CorpusArgs,
    fractions: Vec<f64>,
    seed: u64,
    budget_tokens: Option<usize>,
    format: &str,
) -> Result<()> {
    let corpus = corpus_args.load()?;
    let transport = endpoint.transport();
    let config = NiahConfig {
        fractions,
        model: endpoint.model.clone(),
        haystack_budget_tokens: budget_tokens,
        ..NiahConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(seed);

    let trials = harness::run_niah(&transport, &corpus, &config, &mut rng)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&trials).expect("serializable records"));
        return Ok(());
    }

    println!("NIAH: {} ({} estimated tokens)", corpus.title(), corpus.estimated_tokens());
    for trial in &trials {
        println!(
            "  depth {:>4.0}% | ~{} tokens | {:?} | {:.2}s",
            trial.fraction * 100.0,
            trial.context_tokens,
            trial.outcome,
            trial.latency_ms / 1000.0
        );
        if let Some(response) = &trial.response {
            println!("    response: {}", excerpt(response, 160));
        }
        if let Some(message) = &trial.message {
            println!("    error: {}", excerpt(message, 160));
        }
    }
    let found = trials
        .iter()
        .filter(|t| t.outcome == ProbeOutcome::Success)
        .count();
    println!("  retrieved {}/{}", found, trials.len());
    Ok(())
}

fn handle_scaling(
    endpoint: &EndpointArgs,
    sizes: Option<Vec<usize>>,
    continue_on_error: bool,
    format: &str,
) -> Result<()> {
    let transport = endpoint.transport();
    let mut config = ScalingConfig {
        model: endpoint.model.clone(),
        error_policy: if continue_on_error {
            ErrorPolicy::ContinueOnError
        } else {
            ErrorPolicy::FailFast
        },
        ..ScalingConfig::default()
    };
    if let Some(sizes) = sizes {
        config.target_sizes = sizes;
    }

    let probe = ScalingProbe::new(&transport, config)?;
    let run = probe.run();

    if format == "json" {
        let record = serde_json::json!({
            "verdict": run.verdict(),
            "steps": run.steps(),
        });
        println!("{}", serde_json::to_string_pretty(&record).expect("serializable records"));
        return Ok(());
    }

    println!("Context scaling run: {:?}", run.verdict());
    for step in run.steps() {
        let tps = step
            .throughput_tps
            .map_or_else(|| "-".to_string(), |t| format!("{t:.1} tok/s"));
        println!(
            "  {:>7} tokens | {:?} | {:.2}s | {}",
            step.target_tokens,
            step.outcome,
            step.latency_ms / 1000.0,
            tps
        );
        if let Some(message) = &step.message {
            println!("    {}", excerpt(message, 160));
        }
    }
    Ok(())
}

fn handle_survey(
    endpoint: &EndpointArgs,
    corpus_args: &CorpusArgs,
    budget_tokens: usize,
    format: &str,
) -> Result<()> {
    let corpus = corpus_args.load()?;
    let transport = endpoint.transport();
    let config = SurveyConfig {
        budget_tokens,
        model: endpoint.model.clone(),
        ..SurveyConfig::default()
    };

    let probes = harness::run_survey(&transport, &corpus, &config);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&probes).expect("serializable records"));
        return Ok(());
    }

    println!("Survey: {} (budget ~{} tokens)", corpus.title(), budget_tokens);
    for probe in &probes {
        println!(
            "  {:<14} | {:?} | {:.2}s",
            probe.name,
            probe.outcome,
            probe.latency_ms / 1000.0
        );
        if let Some(response) = &probe.response {
            println!("    {}", excerpt(response, 200));
        }
        if let Some(message) = &probe.message {
            println!("    error: {}", excerpt(message, 160));
        }
    }
    Ok(())
}

fn handle_books() {
    println!("Registered books:");
    for book in BOOKS {
        println!(
            "  {:<14} {} (~{} tokens)",
            book.key, book.title, book.approx_tokens
        );
    }
}

/// First `max` bytes of `text` on a char boundary, single-line
fn excerpt(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.len() <= max {
        return flat;
    }
    let mut cut = max;
    while !flat.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &flat[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_scaling_sizes() {
        let cli = Cli::try_parse_from([
            "sondear",
            "scaling",
            "--url",
            "http://localhost:8000",
            "--sizes",
            "1000,5000,10000",
            "--continue-on-error",
        ])
        .expect("valid args");
        match cli.command {
            Commands::Scaling {
                sizes,
                continue_on_error,
                ..
            } => {
                assert_eq!(sizes, Some(vec![1000, 5000, 10000]));
                assert!(continue_on_error);
            },
            _ => panic!("expected scaling subcommand"),
        }
    }

    #[test]
    fn test_cli_parses_niah_defaults() {
        let cli = Cli::try_parse_from(["sondear", "niah", "--url", "http://h:1"])
            .expect("valid args");
        match cli.command {
            Commands::Niah {
                fractions,
                seed,
                corpus,
                ..
            } => {
                assert_eq!(fractions, vec![0.1, 0.5, 0.9]);
                assert_eq!(seed, 42);
                assert_eq!(corpus.book, "moby_dick");
            },
            _ => panic!("expected niah subcommand"),
        }
    }

    #[test]
    fn test_cli_requires_url() {
        assert!(Cli::try_parse_from(["sondear", "scaling"]).is_err());
    }

    #[test]
    fn test_excerpt_truncates_and_flattens() {
        assert_eq!(excerpt("a\nb", 10), "a b");
        let long = "x".repeat(50);
        let cut = excerpt(&long, 10);
        assert_eq!(cut, format!("{}...", "x".repeat(10)));
    }
}
