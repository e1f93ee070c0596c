//! fscatalog - Concurrent File-Cataloging Crawler
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use fscatalog::catalog::{drop_catalog, CatalogConnector, MemoryCatalog, SqliteCatalog, SqliteConnector};
use fscatalog::config::{CliArgs, Command, ScanConfig, Settings};
use fscatalog::crawl::{ScanCoordinator, ScanSummary};
use fscatalog::format::{ListedFile, Listing};
use fscatalog::identify::{FileIdentifier, Identifier};
use fscatalog::progress::{format_number, print_header, print_summary, ProgressReporter};
use fscatalog::search;
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    let settings = Settings::load(&args).context("Invalid configuration")?;

    match &args.command {
        Command::Scan { .. } => {
            let config =
                ScanConfig::from_args(&args, &settings).context("Invalid configuration")?;
            run_scan(config)
        }
        Command::Init => {
            SqliteCatalog::create(&settings.catalog).with_context(|| {
                format!("Failed to create catalog {}", settings.catalog.display())
            })?;
            println!("Initialized catalog {}", settings.catalog.display());
            Ok(())
        }
        Command::Drop => {
            if drop_catalog(&settings.catalog)? {
                println!("Dropped catalog {}", settings.catalog.display());
            } else {
                println!("No catalog at {}", settings.catalog.display());
            }
            Ok(())
        }
        Command::Info => show_info(&settings.catalog),
        Command::Dump { table } => {
            let catalog = open_catalog(&settings.catalog)?;
            for row in catalog.dump(table)? {
                println!("{}", row.join("\t"));
            }
            Ok(())
        }
        Command::Search { pattern, full } => {
            let mut catalog = open_catalog(&settings.catalog)?;
            let listing = search::search(&mut catalog, pattern).context("Search failed")?;
            print!("{}", listing.render(*full));
            Ok(())
        }
        Command::Id { files, full } => identify_files(files, *full),
        Command::Config => {
            for path in &settings.loaded_from {
                println!("# from {}", path.display());
            }
            print!("{}", settings.to_toml());
            Ok(())
        }
    }
}

/// Crawl into the configured catalog (or an in-memory one for dry runs)
fn run_scan(config: ScanConfig) -> Result<()> {
    let roots: Vec<String> = config
        .roots
        .iter()
        .map(|r| r.display().to_string())
        .collect();
    let catalog_label = if config.dry_run {
        "(in memory)".to_string()
    } else {
        config.catalog_path.display().to_string()
    };

    // Print header
    if config.show_progress {
        print_header(&roots, config.worker_count, &catalog_label);
    }

    if config.dry_run {
        let catalog = MemoryCatalog::new();
        let summary = run_crawl(config.clone(), catalog.clone())?;
        report(&config, &summary, &catalog_label, None);
        info!(
            entries = catalog.entry_count(),
            metadata = catalog.metadata_count(),
            "Dry run finished"
        );
        return Ok(());
    }

    let path = config.catalog_path.clone();
    let catalog = SqliteCatalog::create(&path)
        .with_context(|| format!("Failed to open catalog {}", path.display()))?;
    catalog.record_scan_start(&roots)?;

    let summary = run_crawl(config.clone(), SqliteConnector::new(&path))?;

    catalog.record_scan_end(summary.visited, summary.errors, summary.completed)?;
    let size = std::fs::metadata(&path).ok().map(|m| m.len());
    report(&config, &summary, &catalog_label, size);

    Ok(())
}

fn run_crawl<C: CatalogConnector>(config: ScanConfig, connector: C) -> Result<ScanSummary> {
    let show_progress = config.show_progress;
    let coordinator = ScanCoordinator::new(config, connector, FileIdentifier::new())
        .context("Failed to initialize crawler")?;

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let progress = show_progress.then(ProgressReporter::new);
    if let Some(ref p) = progress {
        p.set_status("Starting workers...");
    }

    let summary = coordinator
        .run_with_progress(|update| {
            if let Some(ref p) = progress {
                p.update(update);
            }
        })
        .context("Scan failed")?;

    if let Some(ref p) = progress {
        if summary.completed {
            p.finish("Scan completed");
        } else {
            p.finish("Scan interrupted");
        }
    }

    Ok(summary)
}

fn report(config: &ScanConfig, summary: &ScanSummary, catalog: &str, size: Option<u64>) {
    if config.show_progress {
        print_summary(summary, catalog, size);
    }

    if !summary.completed {
        info!("Scan was interrupted before completion");
    }
    if summary.errors > 0 {
        info!(errors = summary.errors, "Scan completed with errors");
    }
    if summary.worker_failures > 0 {
        warn!(failures = summary.worker_failures, "Some workers failed");
    }
}

fn open_catalog(path: &Path) -> Result<SqliteCatalog> {
    SqliteCatalog::open(path).with_context(|| format!("Failed to open catalog {}", path.display()))
}

fn show_info(path: &Path) -> Result<()> {
    let info = open_catalog(path)?.info()?;

    println!("catalog: {}", info.path.display());
    if let Some(size) = info.file_size {
        println!("size: {} bytes", format_number(size));
    }
    println!("sqlite: {}", info.sqlite_version);
    for table in &info.tables {
        println!("table {}: {} rows", table.name, format_number(table.rows));
        for (name, kind) in &table.columns {
            println!("    {} {}", name, kind);
        }
    }
    Ok(())
}

/// Identify files directly, without the catalog
fn identify_files(files: &[std::path::PathBuf], full: bool) -> Result<()> {
    let mut identifier = FileIdentifier::new().checksum(full);
    let mut listing = Listing::new();

    for file in files {
        let meta = std::fs::metadata(file)
            .with_context(|| format!("Cannot stat {}", file.display()))?;
        let id = identifier
            .identify(file)
            .with_context(|| format!("Cannot identify {}", file.display()))?;

        listing.add_file(
            &file.display().to_string(),
            ListedFile {
                size: meta.len(),
                mtime_ns: fscatalog::crawl::worker::mtime_ns(&meta),
                content_hash: id.content_hash,
            },
            id.metadata,
        );
    }

    print!("{}", listing.render(full));
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("fscatalog=debug,warn")
    } else {
        EnvFilter::new("fscatalog=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
