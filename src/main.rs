//! # mdlens
//!
//! Command-line front end for the mdlens document core.
//!
//! ## Usage
//!
//! Show the heading tree:
//! ```sh
//! mdlens --toc README.md
//! ```
//!
//! Search and export:
//! ```sh
//! mdlens --search install --export html --export pdf README.md
//! ```
//!
//! Open in the browser at a section:
//! ```sh
//! mdlens --open --anchor usage README.md
//! ```
//!
//! Keep watching the file and re-run on every save:
//! ```sh
//! mdlens --toc --watch README.md
//! ```

mod cli;

use clap::Parser as ClapParser;
use cli::{Cli, ExportTarget, OutputFormat};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use mdlens::{Config, DocumentSession, ExportFormat, ExportReport, FileWatcher, diagram};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

const WATCH_TICK: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    color_eyre::install()?;
    // Info by default; RUST_LOG overrides
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Cli::parse();

    let mut config = Config::load();
    if let Some(dir) = &args.export_dir {
        config.export.directory = dir.clone();
    }

    let mut session = DocumentSession::open(&args.file, config)
        .wrap_err_with(|| format!("cannot open {}", args.file.display()))?;

    run_once(&args, &mut session)?;

    if args.watch {
        if session.config().watch.enabled {
            watch(&args, &mut session)?;
        } else {
            log::warn!("live reload is disabled in the config file, ignoring --watch");
        }
    }

    Ok(())
}

/// Produce every requested output for the current version.
fn run_once(args: &Cli, session: &mut DocumentSession) -> Result<()> {
    if !args.has_mode() {
        print_toc(session, &args.output)?;
    }
    if args.toc {
        print_toc(session, &args.output)?;
    }
    if args.list {
        print_headings(session, &args.output)?;
    }
    if let Some(query) = &args.search {
        let case_sensitive = args.case_sensitive || session.config().search.case_sensitive;
        print_search(session, query, case_sensitive, &args.output)?;
    }
    if args.diagrams {
        print_diagrams(session, &args.output)?;
    }
    if let Some(n) = args.open_diagram {
        open_diagram(session, n)?;
    }
    let mut exported_html = None;
    if !args.export.is_empty() {
        let formats = export_formats(&args.export, session.config());
        session.request_export(formats);
        if let Some(report) = session.wait_export() {
            print_report(&report, &args.output)?;
            exported_html = report
                .artifacts
                .iter()
                .find(|a| a.format == ExportFormat::StandaloneMarkup && a.succeeded())
                .map(|a| a.output_path.clone());
        }
    }
    if args.open {
        open_document(session, exported_html, args.anchor.as_deref())?;
    }
    Ok(())
}

fn watch(args: &Cli, session: &mut DocumentSession) -> Result<()> {
    let mut watcher = FileWatcher::new(session.config().watch.debounce())?;
    watcher.watch(&args.file)?;
    let notifier = session.notifier();
    log::info!("watching {} for changes (Ctrl-C to stop)", args.file.display());

    loop {
        watcher.forward_to(&notifier);

        match session.poll_changes() {
            Some(Ok(outcome)) if outcome.content_changed => {
                println!("--- v{} ---", outcome.version);
                run_once(args, session)?;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => eprintln!("Reload failed: {}", e),
            None => {}
        }

        thread::sleep(WATCH_TICK);
    }
}

fn export_formats(targets: &[ExportTarget], config: &Config) -> BTreeSet<ExportFormat> {
    let mut formats = BTreeSet::new();
    for target in targets {
        match target {
            ExportTarget::All => formats.extend(config.export.formats.iter().copied()),
            ExportTarget::Format(format) => {
                formats.insert(*format);
            }
        }
    }
    formats
}

fn print_toc(session: &mut DocumentSession, format: &OutputFormat) -> Result<()> {
    let toc = session.toc();

    match format {
        OutputFormat::Plain => print!("{}", toc.tree().render_box_tree(toc.headers())),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(toc.headers())?),
    }
    Ok(())
}

fn print_headings(session: &mut DocumentSession, format: &OutputFormat) -> Result<()> {
    let toc = session.toc();

    match format {
        OutputFormat::Plain => {
            for header in toc.headers() {
                let prefix = "#".repeat(header.level);
                println!(
                    "{:>5}  {} {}  (#{})",
                    header.line_offset + 1,
                    prefix,
                    header.title,
                    header.anchor_id
                );
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(toc.anchors())?),
    }
    Ok(())
}

fn print_search(
    session: &mut DocumentSession,
    query: &str,
    case_sensitive: bool,
    format: &OutputFormat,
) -> Result<()> {
    let document = session.document();
    let cursor = session.search(query, case_sensitive);

    match format {
        OutputFormat::Plain => {
            let lines: Vec<&str> = document.raw_text().lines().collect();
            for m in &cursor.matches().matches {
                let line = lines.get(m.line_offset).copied().unwrap_or_default();
                println!("{}:{}: {}", m.line_offset + 1, m.start_column + 1, line);
            }
            println!("{} matches", cursor.matches().len());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(cursor.matches())?),
    }
    Ok(())
}

fn print_diagrams(session: &mut DocumentSession, format: &OutputFormat) -> Result<()> {
    let diagram_config = session.config().diagram.clone();
    let toc = session.toc();
    let diagrams = &toc.structure().diagrams;

    match format {
        OutputFormat::Plain => {
            if diagrams.is_empty() {
                println!("No diagrams found");
            }
            for (i, block) in diagrams.iter().enumerate() {
                println!("Diagram {} (line {}):", i + 1, block.line_offset + 1);
                for line in diagram::placeholder_lines(
                    block,
                    diagram_config.preview_lines,
                    diagram_config.preview_width,
                ) {
                    println!("{}", line);
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(diagrams)?),
    }
    Ok(())
}

fn open_diagram(session: &mut DocumentSession, n: usize) -> Result<()> {
    let toc = session.toc();
    let block = n
        .checked_sub(1)
        .and_then(|i| toc.structure().diagrams.get(i))
        .ok_or_else(|| eyre!("no diagram #{} (document has {})", n, toc.structure().diagrams.len()))?
        .clone();

    let dir = std::env::temp_dir().join("mdlens");
    let path = diagram::open_preview(&block, &dir)
        .wrap_err("could not open diagram preview")?;
    println!("Opened {}", path.display());
    Ok(())
}

fn open_document(
    session: &mut DocumentSession,
    exported_html: Option<PathBuf>,
    anchor: Option<&str>,
) -> Result<()> {
    if let Some(anchor) = anchor
        && session.resolve_anchor(anchor).is_none()
    {
        log::warn!("no heading with anchor #{anchor}, opening at the top");
    }

    let path = match exported_html {
        Some(path) => path,
        None => {
            let dir = std::env::temp_dir().join("mdlens");
            session
                .write_document_preview(&dir)
                .wrap_err("could not write document preview")?
        }
    };
    let url = diagram::open_page(&path, anchor).wrap_err("could not open browser")?;
    println!("Opened {}", url);
    Ok(())
}

fn print_report(report: &ExportReport, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Plain => {
            for artifact in &report.artifacts {
                let mark = if artifact.succeeded() { "ok" } else { "FAILED" };
                println!(
                    "{:<6} {:<24} {}",
                    mark,
                    artifact.format.to_string(),
                    artifact.output_path.display()
                );
            }
            println!("{}", report.summary());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}
