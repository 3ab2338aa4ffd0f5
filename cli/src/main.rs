//! `errscope` — gather source context for a compiler error.
//!
//! Prints the formatted context bundle to stdout; all diagnostics go to
//! stderr. Missing language servers or search tools degrade the bundle,
//! they never fail the run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use errscope_context::{GatherOptions, format_context, gather_context};
use errscope_lsp::{ClientRegistry, Language};

#[derive(Parser)]
#[command(name = "errscope")]
#[command(about = "Gather source context for compiler-error analysis", version)]
struct Cli {
    /// Error message, or path to a file containing one
    error_input: String,

    /// Project directory to search
    #[arg(default_value = ".")]
    project_dir: PathBuf,

    /// Primary language (cpp, c, rust, python)
    #[arg(short, long, default_value = "cpp")]
    lang: String,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Disable language-server lookups
    #[arg(long)]
    no_lsp: bool,

    /// Enable structural search for deep definition resolution
    /// (slow on large codebases)
    #[arg(long)]
    structural: bool,

    /// Rounds of identifier resolution with --structural
    #[arg(long, default_value_t = 2)]
    max_depth: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    // A path argument wins over a literal message when the file exists.
    let error_path = PathBuf::from(&cli.error_input);
    let error_text = if error_path.exists() {
        std::fs::read_to_string(&error_path)
            .with_context(|| format!("reading {}", error_path.display()))?
    } else {
        cli.error_input.clone()
    };

    let project_dir = cli
        .project_dir
        .canonicalize()
        .with_context(|| format!("resolving {}", cli.project_dir.display()))?;

    let options = GatherOptions {
        language: Language::from_name(&cli.lang),
        max_depth: cli.max_depth,
        use_language_server: !cli.no_lsp,
        use_structural_search: cli.structural,
        ..GatherOptions::default()
    };

    tracing::info!(
        project = %project_dir.display(),
        lang = options.language.name(),
        lsp = options.use_language_server,
        structural = options.use_structural_search,
        "gathering context"
    );

    let mut registry = ClientRegistry::new();
    let ctx = gather_context(&error_text, &project_dir, &options, &mut registry).await;

    tracing::info!(
        identifiers = ctx.identifiers.len(),
        definitions = ctx.definitions.len(),
        unresolved = ctx.unresolved_refs.len(),
        "gather finished"
    );

    println!("{}", format_context(&ctx));

    registry.shutdown_all().await;
    Ok(())
}
