//! Entry point for the libprov tool.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap`.
//! 2. Collect the mapped-library record from `--lib` and `--lib-list`.
//! 3. Require the executable to match the `X86_64` backend (the only supported architecture).
//! 4. Run the analysis and print one verdict per mapped library.
//!
//! Error handling is done via `anyhow`.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;

use libprov::arch::x86_64::X86_64;
use libprov::arch::Architecture;
use libprov::config::{AnalyzerConfig, Cli};
use libprov::logging::init_tracing;
use libprov::{Analyzer, MappedLibrary};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut names = cli.libs.clone();
    if let Some(list) = &cli.lib_list {
        let text = fs::read_to_string(list)
            .with_context(|| format!("failed to read {}", list.display()))?;
        names.extend(parse_lib_list(&text));
    }
    if names.is_empty() {
        anyhow::bail!("no mapped libraries given (use --lib or --lib-list)");
    }

    // Architecture Check
    let arch = X86_64;
    let config = AnalyzerConfig {
        expected_machine: Some(arch.machine()),
        ..cli.analyzer_config()
    };
    let analyzer = Analyzer::new(config);
    let mut mapped: Vec<MappedLibrary> = names.into_iter().map(MappedLibrary::new).collect();
    let analysis = analyzer
        .analyze(&cli.executable, &mut mapped)
        .with_context(|| {
            format!(
                "failed to analyze {} (only {} is supported)",
                cli.executable.display(),
                arch.name()
            )
        })?;

    for (lib, verdict) in mapped.iter().zip(&analysis.verdicts) {
        println!("{}\t{}", lib.name, verdict.as_str());
    }
    println!(
        "{} of {} mapped libraries unexplained",
        analysis.injected_count(),
        mapped.len()
    );
    Ok(())
}

/// One library name per line; blank lines and `#` comments are skipped.
fn parse_lib_list(text: &str) -> impl Iterator<Item = String> + '_ {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}
