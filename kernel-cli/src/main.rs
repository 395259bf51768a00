//! Logic Kernel CLI — exercising binary for the fact store, control gate,
//! and hot-load pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use kernel_core::atom::Atom;
use kernel_core::config::KernelConfig;
use kernel_core::fact::Fact;
use kernel_core::kernel::Kernel;
use kernel_core::syntax::parse_fact_text;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "kernel")]
#[command(about = "Logic Kernel - a neuro-symbolic reasoning substrate")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Kernel configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assert one fact, e.g. `safe_action(/read_file).`
    Assert {
        /// Fact text, e.g. `safe_action(/read_file).`
        fact: String,
    },

    /// Retract every fact matching a predicate and argument prefix
    Retract {
        /// Predicate name
        predicate: String,
        /// Bound prefix arguments, e.g. `/read_file`
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Query a predicate, printing every EDB∪IDB fact that matches
    Query {
        /// Predicate name
        predicate: String,
    },

    /// Validate a candidate rule against the hot-load pipeline without installing it
    Validate {
        /// Rule text, e.g. `idle(X) :- item(X), not active(X).`
        rule: String,
    },

    /// Load a `.facts` file (one fact per line) into a fresh kernel, then query a predicate
    Load {
        /// Path to a file of newline-delimited facts
        file: String,
        /// Predicate to query after loading
        #[arg(short, long)]
        query: Option<String>,
    },
}

fn build_kernel(config_path: &Option<String>) -> Result<Kernel> {
    let config = match config_path {
        Some(path) => KernelConfig::load(path).with_context(|| format!("failed to load config: {path}"))?,
        None => KernelConfig::default(),
    };
    Ok(Kernel::new(Vec::new(), HashMap::new(), Arc::new(config)))
}

fn print_fact(fact: &Fact) {
    println!("  {}", fact.render_source());
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        kernel_core::tracing_setup::init_tracing_with_config(kernel_core::tracing_setup::TracingConfig::verbose());
    } else {
        kernel_core::tracing_setup::init_tracing();
    }

    match cli.command {
        Commands::Assert { fact } => assert_command(&cli.config, &fact)?,
        Commands::Retract { predicate, args } => retract_command(&cli.config, &predicate, &args)?,
        Commands::Query { predicate } => query_command(&cli.config, &predicate)?,
        Commands::Validate { rule } => validate_command(&rule)?,
        Commands::Load { file, query } => load_command(&cli.config, &file, query)?,
    }

    Ok(())
}

fn assert_command(config: &Option<String>, fact_text: &str) -> Result<()> {
    let kernel = build_kernel(config)?;
    let (predicate, args) = parse_fact_text(fact_text).with_context(|| format!("failed to parse fact: {fact_text}"))?;
    let fact = Fact::new(predicate, args);
    let start = Instant::now();
    kernel.assert(fact.clone())?;
    println!("{} Asserted: {}", "✓".green(), fact.render_source());
    println!("{} {:.3}ms", "▸".blue(), start.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}

fn retract_command(config: &Option<String>, predicate: &str, raw_args: &[String]) -> Result<()> {
    let kernel = build_kernel(config)?;
    let args: Vec<Atom> = raw_args
        .iter()
        .map(|a| Atom::name(a.trim_start_matches('/')))
        .collect();
    let removed = kernel.retract_match(predicate, &args)?;
    println!("{} Retracted {} fact(s) matching {}", "✓".green(), removed, predicate);
    Ok(())
}

fn query_command(config: &Option<String>, predicate: &str) -> Result<()> {
    let kernel = build_kernel(config)?;
    let start = Instant::now();
    let results = kernel.query(predicate)?;
    println!("{} {} result(s) for {}:", "→".blue(), results.len(), predicate);
    for fact in &results {
        print_fact(fact);
    }
    println!("{} {:.3}ms", "▸".blue(), start.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}

fn validate_command(rule_text: &str) -> Result<()> {
    let rule = match Kernel::parse_rule_preview(rule_text) {
        Ok(rule) => rule,
        Err(e) => {
            println!("{} Rule rejected: {}", "✗".red(), e);
            std::process::exit(1);
        }
    };

    // Run the candidate through a scratch kernel's hot-load pipeline to
    // check safety and the sandbox-compile stages without touching any
    // real session state.
    let scratch = Kernel::new(Vec::new(), HashMap::new(), Arc::new(KernelConfig::default()));
    match scratch.hot_load(rule_text, None) {
        Ok(()) => println!("{} Rule parses: {:?}", "✓".green(), rule.head),
        Err(e) => {
            println!("{} Rule rejected: {}", "✗".red(), e);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn load_command(config: &Option<String>, path: &str, query: Option<String>) -> Result<()> {
    let kernel = build_kernel(config)?;
    let contents = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;

    let mut loaded = 0usize;
    let mut failed = 0usize;
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_fact_text(trimmed) {
            Ok((predicate, args)) => {
                kernel.assert(Fact::new(predicate, args))?;
                loaded += 1;
            }
            Err(_) => failed += 1,
        }
    }
    println!("{} Loaded {} fact(s), {} line(s) failed to parse", "✓".green(), loaded, failed);

    if let Some(predicate) = query {
        let results = kernel.query(&predicate)?;
        println!("{} {} result(s) for {}:", "→".blue(), results.len(), predicate);
        for fact in &results {
            print_fact(fact);
        }
    }
    Ok(())
}
