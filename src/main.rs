//! Main entry point for the zipreach CLI application.
//!
//! Provides a command-line interface for listing and extracting ZIP files
//! from both local filesystem paths and remote HTTP URLs, and a `serve`
//! subcommand that runs the gateway relay in-process.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;

use zipreach::cli::Command;
use zipreach::config::PolicyConfig;
use zipreach::handle::ArchiveHandle;
use zipreach::zip::{Entry, EntryExtractor};
use zipreach::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Some(Command::Serve(args)) = &cli.command {
        return run_serve(args.clone()).await;
    }

    let Some(file) = cli.file.clone() else {
        anyhow::bail!("a FILE argument is required unless a subcommand is given");
    };

    let policy = PolicyConfig::default();
    let handle = if cli.is_http_url() {
        ArchiveHandle::from_url(&file, cli.proxy_base.clone(), policy).await?
    } else {
        ArchiveHandle::from_path(Path::new(&file)).await?
    };

    for warning in &handle.warnings {
        if !cli.is_quiet() {
            eprintln!("warning: {warning}");
        }
    }

    process_zip(&handle, &cli, policy).await
}

async fn run_serve(args: zipreach::cli::ServeArgs) -> Result<()> {
    use std::sync::Arc;
    use zipreach::proxy::relay::{GatewayState, create_router};

    let mut policy = PolicyConfig::default();
    if let Some(max) = args.max_response_bytes {
        policy.proxy_max_response_bytes = max;
    }

    let state = Arc::new(GatewayState::new(policy));
    let router = create_router(state);

    tracing::info!(bind = %args.bind, "starting zipreach-gateway relay");
    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn process_zip(handle: &ArchiveHandle, cli: &Cli, policy: PolicyConfig) -> Result<()> {
    if cli.list || cli.verbose {
        return list_files(&handle.entries, cli.verbose);
    }

    let files_to_extract: Vec<&Entry> = handle
        .entries
        .iter()
        .filter(|e| {
            if e.is_directory {
                return false;
            }

            if !cli.files.is_empty() {
                let matches = cli.files.iter().any(|f| {
                    if has_glob_chars(f) {
                        glob_match(f, &e.path)
                    } else {
                        e.path == *f || e.name == *f
                    }
                });
                if !matches {
                    return false;
                }
            }

            if cli
                .exclude
                .iter()
                .any(|x| e.path.contains(x) || glob_match(x, &e.path))
            {
                return false;
            }

            true
        })
        .collect();

    let extractor = EntryExtractor::new(handle.source.clone(), policy);
    let multiple_files = cli.pipe && files_to_extract.len() > 1;
    for entry in files_to_extract {
        extract_file(&extractor, entry, cli, multiple_files).await?;
    }

    Ok(())
}

fn list_files(entries: &[Entry], verbose: bool) -> Result<()> {
    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in entries {
        if verbose {
            let (year, month, day) = entry.mod_date();
            let (hour, minute, _second) = entry.mod_time();

            let ratio = if entry.uncompressed_size > 0 {
                format!(
                    "{:>4}%",
                    100 - (entry.compressed_size * 100 / entry.uncompressed_size)
                )
            } else {
                "  0%".to_string()
            };

            println!(
                "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
                entry.uncompressed_size,
                entry.compressed_size,
                ratio,
                year,
                month,
                day,
                hour,
                minute,
                entry.path
            );

            if !entry.is_directory {
                total_uncompressed += entry.uncompressed_size;
                total_compressed += entry.compressed_size;
                file_count += 1;
            }
        } else {
            println!("{}", entry.path);
        }
    }

    if verbose {
        println!("{}", "-".repeat(70));
        let total_ratio = if total_uncompressed > 0 {
            format!(
                "{:>4}%",
                100 - (total_compressed * 100 / total_uncompressed)
            )
        } else {
            "  0%".to_string()
        };
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed, total_compressed, total_ratio, "", file_count
        );
    }

    Ok(())
}

async fn extract_file(
    extractor: &EntryExtractor,
    entry: &Entry,
    cli: &Cli,
    show_filename: bool,
) -> Result<()> {
    if cli.pipe {
        if show_filename {
            use tokio::io::AsyncWriteExt;
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(format!("--- {} ---\n", entry.path).as_bytes())
                .await?;
        }
        let bytes = extractor.raw(entry).await?;
        use tokio::io::AsyncWriteExt;
        tokio::io::stdout().write_all(&bytes).await?;
        return Ok(());
    }

    let base_name = if cli.junk_paths {
        Path::new(&entry.path)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| entry.path.clone())
    } else {
        entry.path.clone()
    };
    let output_path = match &cli.extract_dir {
        Some(dir) => PathBuf::from(dir).join(&base_name),
        None => PathBuf::from(&base_name),
    };

    if output_path.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", entry.path);
            }
            return Ok(());
        }
        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", entry.path);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", entry.path);
    }

    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = extractor.raw(entry).await?;
    tokio::fs::write(&output_path, &bytes).await?;

    Ok(())
}

fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}
