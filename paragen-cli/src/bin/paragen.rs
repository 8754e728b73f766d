//! `paragen` — build and inspect quantile statistics, inspect a schema, and
//! run an end-to-end demo generation against the bundled stub backend.
//!
//! Mirrors the shape of this codebase's existing CLI binaries: one binary,
//! `clap::Parser`/`clap::Subcommand`, `anyhow::Result` throughout.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use paragen_engine::backend::StubBackend;
use paragen_engine::config::EngineConfig;
use paragen_engine::processor::{CorpusItem, ParameterProcessor};
use paragen_engine::schema::Schema;
use paragen_engine::tokenizer::TokenizerAdapter;
use paragen_engine::Engine;

/// paragen — grammar-constrained parametric-3D-object JSON generation.
#[derive(Parser, Debug)]
#[command(name = "paragen")]
#[command(about = "grammar-constrained parametric-3D-object JSON generation")]
struct Cli {
    /// Enable debug-level logging for paragen_engine.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build or inspect a quantile-statistics file.
    Stats {
        #[command(subcommand)]
        command: StatsCommands,
    },

    /// Inspect a schema file.
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },

    /// Run an end-to-end demo generation against the bundled stub backend.
    Demo {
        #[command(subcommand)]
        command: DemoCommands,
    },
}

#[derive(Subcommand, Debug)]
enum StatsCommands {
    /// Build a statistics file from a schema and a JSON corpus.
    Build {
        /// Schema JSON file.
        #[arg(long)]
        schema: PathBuf,
        /// Corpus JSON file: an array of conceptualization records.
        #[arg(long)]
        corpus: PathBuf,
        /// Output path for the built statistics file.
        #[arg(short, long, default_value = "stats.json")]
        output: PathBuf,
    },
    /// Print a summary of a built statistics file.
    Show {
        /// Schema JSON file (needed to resolve category/template/param names).
        #[arg(long)]
        schema: PathBuf,
        /// Statistics JSON file.
        stats: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum SchemaCommands {
    /// Print every category/template/parameter in a schema file.
    Show {
        /// Schema JSON file.
        schema: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum DemoCommands {
    /// Generate one document against the bundled stub backend.
    Run {
        /// Schema JSON file.
        #[arg(long)]
        schema: PathBuf,
        /// Token id the stub backend emits as end-of-stream.
        #[arg(long, default_value_t = 999_999)]
        eos: u32,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "paragen_cli=debug,paragen_engine=debug"
    } else {
        "paragen_cli=info,paragen_engine=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_schema(path: &PathBuf) -> Result<Schema> {
    let text = fs::read_to_string(path).with_context(|| format!("reading schema file {path:?}"))?;
    Schema::from_json_str(&text).with_context(|| format!("parsing schema file {path:?}"))
}

fn run_stats_build(schema: PathBuf, corpus: PathBuf, output: PathBuf) -> Result<()> {
    let schema = load_schema(&schema)?;
    let corpus_text = fs::read_to_string(&corpus).with_context(|| format!("reading corpus file {corpus:?}"))?;
    let items: Vec<CorpusItem> =
        serde_json::from_str(&corpus_text).with_context(|| format!("parsing corpus file {corpus:?}"))?;

    eprintln!("Collecting statistics from {} corpus records...", items.len());
    let config = EngineConfig::default();
    let processor = ParameterProcessor::collect(&schema, &items, &config);

    let json = processor.to_json(&schema)?;
    fs::write(&output, json).with_context(|| format!("writing statistics file {output:?}"))?;
    eprintln!("Wrote {output:?}");
    Ok(())
}

fn run_stats_show(schema: PathBuf, stats: PathBuf) -> Result<()> {
    let schema = load_schema(&schema)?;
    let text = fs::read_to_string(&stats).with_context(|| format!("reading statistics file {stats:?}"))?;
    let processor = ParameterProcessor::load(&text, &schema)?;
    // Re-serialize through the schema to print a name-resolved summary.
    println!("{}", processor.to_json(&schema)?);
    Ok(())
}

fn run_schema_show(schema: PathBuf) -> Result<()> {
    let schema = load_schema(&schema)?;
    for category in schema.category_ids() {
        println!("{}", schema.category_name(category));
        for template in schema.template_ids(category) {
            println!("  {}", schema.template_name(category, template));
            for param in schema.param_ids(category, template) {
                println!(
                    "    {} (dims={})",
                    schema.param_name(category, template, param),
                    schema.param_dims(category, template, param)
                );
            }
        }
    }
    Ok(())
}

/// The ten fixed literals the FSM emits, in transition order, duplicated
/// here (rather than imported) because building a demo tokenizer is the one
/// place outside `paragen_engine`'s own test fixtures that needs to name
/// them as plain text instead of consuming them through `Literals`.
const FIXED_LITERALS: &[&str] = &[
    "<code>{\"",
    "category\": \"",
    "\", \"pose\": {\"global_position\":",
    " \"global_rotation\":",
    " \"conceptualization\": [{\"template\": \"",
    "\", \"parameters\": {\"",
    " [",
    "], \"",
    "}, {\"template\": \"",
    "}}]}</code>",
];

// "]" (document_end) is listed before "]}" (template_continue) so it gets
// the lower token id: with this demo tokenizer's flat stub-backend logits,
// unscripted greedy argmax always prefers the lower id at
// GEN_TEMPLATE_OR_END, and a demo run should close its document rather
// than loop forever re-emitting templates.
const SPECIAL_GLYPHS: &[&str] = &["\":", "]", "]}", " [-", ",", " ", " -", "],", "]},"];

fn push_vocab_entry(vocab: &mut Vec<(String, u32)>, next_id: &mut u32, text: String) {
    if vocab.iter().any(|(t, _)| *t == text) {
        return;
    }
    vocab.push((text, *next_id));
    *next_id += 1;
}

fn build_demo_tokenizer(schema: &Schema) -> TokenizerAdapter {
    let mut vocab: Vec<(String, u32)> = Vec::new();
    let mut next_id = 1u32;

    for text in FIXED_LITERALS.iter().chain(SPECIAL_GLYPHS) {
        push_vocab_entry(&mut vocab, &mut next_id, text.to_string());
    }
    for d in 0..10u32 {
        push_vocab_entry(&mut vocab, &mut next_id, d.to_string());
    }
    for category in schema.category_ids() {
        push_vocab_entry(&mut vocab, &mut next_id, schema.category_name(category).to_string());
        for template in schema.template_ids(category) {
            push_vocab_entry(
                &mut vocab,
                &mut next_id,
                schema.template_name(category, template).to_string(),
            );
            for param in schema.param_ids(category, template) {
                push_vocab_entry(
                    &mut vocab,
                    &mut next_id,
                    schema.param_name(category, template, param).to_string(),
                );
            }
        }
    }

    TokenizerAdapter::from_vocab(vocab)
}

fn run_demo(schema_path: PathBuf, eos: u32) -> Result<()> {
    let schema = load_schema(&schema_path)?;
    let tokenizer = build_demo_tokenizer(&schema);
    let config = EngineConfig::default();

    let engine = Engine::build(schema, tokenizer, config).context("building demo engine")?;
    let wait_tokens = engine
        .tokenizer()
        .encode_literal("<code>{\"")
        .context("encoding demo wait-code literal")?;
    let mut backend = StubBackend::with_preferred(
        (config.v0 + config.n_bins + 1_000_000) as usize,
        eos,
        wait_tokens,
    );
    let tokens = engine.run(&mut backend).context("running demo generation")?;

    println!("{} tokens emitted:", tokens.len());
    println!("{tokens:?}");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Stats { command } => match command {
            StatsCommands::Build { schema, corpus, output } => run_stats_build(schema, corpus, output),
            StatsCommands::Show { schema, stats } => run_stats_show(schema, stats),
        },
        Commands::Schema { command } => match command {
            SchemaCommands::Show { schema } => run_schema_show(schema),
        },
        Commands::Demo { command } => match command {
            DemoCommands::Run { schema, eos } => run_demo(schema, eos),
        },
    }
}
