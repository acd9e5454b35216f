mod anonymizer;
mod config;
mod files;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use anonymizer::{Anonymizer, MappingTable};
use config::AnonymizerConfig;
use files::{
    discover_input_files, process_json_file, process_jsonl_file, save_mapping, INPUT_PATTERNS,
    MAPPING_FILE_NAME,
};

#[derive(Parser, Debug)]
#[command(
    name = "data-anonymizer",
    about = "Hashes sensitive fields in generated data files and records the hash-to-original mapping.",
    version,
    author = ""
)]
struct Args {
    /// Directory holding the generated files (defaults to the current directory).
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Path to JSON config that augments the default sensitive-field list.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Suppress progress output.
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let anonymizer = Anonymizer::new(config);
    let dir = args.dir.unwrap_or_else(|| PathBuf::from("."));
    run(&dir, &anonymizer, args.quiet)
}

/// One full pass: discover, anonymize each file in order, persist the mapping.
///
/// Files are handled strictly one at a time; the first unrecoverable error
/// aborts the run, leaving files processed so far anonymized and the rest
/// untouched. Nothing is rolled back.
fn run(dir: &Path, anonymizer: &Anonymizer, quiet: bool) -> Result<()> {
    let all_files = discover_input_files(dir)?;

    if all_files.is_empty() {
        if !quiet {
            println!("No generated files found to anonymize.");
            println!("Looking for: {}", pattern_summary());
        }
        return Ok(());
    }

    if !quiet {
        println!("Found {} file(s) to process:", all_files.len());
        for path in &all_files {
            println!("  - {}", path.display());
        }
    }

    let mut mapping = MappingTable::new();
    let mut total_records = 0;
    for path in &all_files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        // System-info payloads carry no sensitive fields and may have an
        // incompatible top-level shape; excluded before any parsing.
        if name.contains("systeminfo") {
            if !quiet {
                println!("  Skipping {} (system info file)", path.display());
            }
            continue;
        }

        if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            let count = process_jsonl_file(path, anonymizer, &mut mapping)?;
            total_records += count;
            if !quiet {
                println!("  Processed {} records from {}", count, path.display());
            }
        } else if process_json_file(path, anonymizer, &mut mapping)? {
            if !quiet {
                println!("  Processed {}", path.display());
            }
        } else if !quiet {
            println!("  Skipped {} (unexpected format)", path.display());
        }
    }

    if mapping.is_empty() {
        if !quiet {
            println!("\nNo fields were anonymized (no matching fields found in files).");
        }
        return Ok(());
    }

    let mapping_path = dir.join(MAPPING_FILE_NAME);
    save_mapping(&mapping, &mapping_path)?;
    if !quiet {
        println!("\nAnonymization complete!");
        println!("  Total unique values hashed: {}", mapping.len());
        println!("  Total records processed: {}", total_records);
        println!("  Mapping saved to: {}", mapping_path.display());
    }
    Ok(())
}

fn pattern_summary() -> String {
    INPUT_PATTERNS
        .iter()
        .map(|(prefix, suffix)| format!("{}*{}", prefix, suffix))
        .collect::<Vec<_>>()
        .join(", ")
}

fn load_config(path: Option<&PathBuf>) -> Result<AnonymizerConfig> {
    match path {
        Some(p) => {
            let raw = fs::read_to_string(p)
                .with_context(|| format!("failed to read config file: {}", p.display()))?;
            let config: AnonymizerConfig = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse config JSON: {}", p.display()))?;
            Ok(config)
        }
        None => Ok(AnonymizerConfig::default()),
    }
}
