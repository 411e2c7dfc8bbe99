//! yamlex CLI - render extended YAML documents

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use yamlex::{dump, load_with, Bindings, FixSuggestion, LoadError, LoadOptions, Node};

#[derive(Parser)]
#[command(name = "yamlex")]
#[command(about = "yamlex - YAML with variables, includes and scripts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a document and print the fully resolved result
    Render {
        #[command(flatten)]
        load: LoadArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Yaml)]
        format: Format,
    },

    /// Print the value at a dotted key path (e.g. `disk.partitions.0.size`)
    Get {
        #[command(flatten)]
        load: LoadArgs,

        /// Dotted key path
        key: String,
    },

    /// Load a document and report whether it resolves
    Check {
        #[command(flatten)]
        load: LoadArgs,
    },
}

#[derive(Args)]
struct LoadArgs {
    /// Path to the YAML document
    file: PathBuf,

    /// Bind a variable (repeatable, beats the environment)
    #[arg(short = 'D', long = "define", value_name = "NAME=VALUE", value_parser = parse_define)]
    defines: Vec<(String, String)>,

    /// Keep unresolvable templates verbatim instead of failing
    #[arg(long)]
    lenient: bool,

    /// Disable placeholder expansion
    #[arg(long)]
    no_expand: bool,
}

impl LoadArgs {
    fn options(&self) -> LoadOptions {
        LoadOptions::default()
            .with_strict(!self.lenient)
            .with_expand(!self.no_expand)
    }

    fn load(&self) -> Result<Node> {
        let params: Bindings = self.defines.iter().cloned().collect();
        let tree = load_with(&self.file, &params, &self.options())?;
        Ok(tree)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

fn parse_define(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("'{}' is not NAME=VALUE", raw))?;
    if name.is_empty() {
        return Err(format!("'{}' has an empty name", raw));
    }
    Ok((name.to_string(), value.to_string()))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render { load, format } => render(&load, format),
        Commands::Get { load, key } => get(&load, &key),
        Commands::Check { load } => check(&load),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.downcast_ref::<LoadError>().and_then(|e| e.fix_suggestion()) {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn render(args: &LoadArgs, format: Format) -> Result<()> {
    let tree = args.load()?;
    match format {
        Format::Yaml => print!("{}", dump(&tree)?),
        Format::Json => {
            let json = serde_json::to_string_pretty(&tree.to_value())
                .context("document cannot be represented as JSON")?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn get(args: &LoadArgs, key: &str) -> Result<()> {
    let tree = args.load()?;
    let node = tree
        .get_path(key)
        .ok_or_else(|| anyhow!("key '{}' not found in {}", key, args.file.display()))?;
    match node.text() {
        Some(text) => println!("{}", text),
        None => print!("{}", dump(node)?),
    }
    Ok(())
}

fn check(args: &LoadArgs) -> Result<()> {
    args.load()?;
    println!("{} {} resolves", "✓".green(), args.file.display());
    Ok(())
}
