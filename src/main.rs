use std::path::{Path, PathBuf};
use std::time::Duration;

use teamsearch::catalog::CatalogRecord;
use teamsearch::cli::{Cli, Commands, ConfigAction};
use teamsearch::config::Config;
use teamsearch::embedding::{prepare_documents, IndexReport};
use teamsearch::error::{Result, TeamSearchError};
use teamsearch::retrieval::{SearchQuery, SearchResult};
use teamsearch::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Query {
            query,
            limit,
            cursor,
            tag,
            top,
            json,
            explain,
        } => {
            let options = QueryOptions {
                limit,
                cursor,
                tag,
                top,
                json,
                explain,
            };
            cmd_query(cli.config, &query, options).await?;
        }
        Commands::Index {
            interval_secs,
            dry_run,
        } => {
            cmd_index(cli.config, interval_secs, dry_run).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "teamsearch=debug"
    } else {
        "teamsearch=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

struct QueryOptions {
    limit: usize,
    cursor: Option<String>,
    tag: Option<String>,
    top: bool,
    json: bool,
    explain: bool,
}

async fn cmd_query(config_path: Option<PathBuf>, text: &str, options: QueryOptions) -> Result<()> {
    let config = load_config(config_path)?;
    let state = AppState::new(config).await?;
    let searcher = state.searcher();

    if options.top {
        let results = searcher.search_top(text, options.limit).await;
        if options.json {
            println!("{}", to_json(&results)?);
        } else {
            print_results(&results, options.explain);
        }
        return Ok(());
    }

    let query = SearchQuery::new(text, options.limit)
        .with_cursor(options.cursor)
        .with_tag(options.tag);
    let page = searcher.search_page(&query).await;

    if options.json {
        println!("{}", to_json(&page)?);
        return Ok(());
    }

    if page.items.is_empty() {
        println!("No matching teams");
        return Ok(());
    }

    println!("{} results (pool of {})", page.items.len(), page.total_estimate);
    print_results(&page.items, options.explain);
    if let Some(cursor) = page.next_cursor {
        println!("\nNext page: --cursor {}", cursor);
    }
    Ok(())
}

fn print_results(results: &[SearchResult], explain: bool) {
    for (i, result) in results.iter().enumerate() {
        let tags = result.record.all_tags().join(", ");
        println!(
            "{:>3}. {} [{:.3}]  {}",
            i + 1,
            result.record.name,
            result.score,
            tags
        );

        if explain {
            let b = &result.breakdown;
            println!(
                "     semantic {:.3} | tags {:.3}/{:.3} | text {:.3} | acronym {:.3}",
                b.semantic, b.primary_tag, b.secondary_tag, b.free_text, b.acronym
            );
            println!(
                "     guardrail {:.3} | partner {:.3} | anchor {:.3} | phrase {:.3}",
                b.guardrail, b.partner, b.anchor, b.phrase
            );
            println!("     synonym {:.3} | id {}", b.synonym, result.id);
        }
    }
}

async fn cmd_index(
    config_path: Option<PathBuf>,
    interval_secs: Option<u64>,
    dry_run: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let state = AppState::new(config).await?;

    if dry_run {
        let records = state.catalog.list_records().await?;
        print_dry_run(records);
        return Ok(());
    }

    let Some(interval) = interval_secs.filter(|s| *s > 0).map(Duration::from_secs) else {
        let report = index_once(&state).await?;
        return ensure_complete(&report);
    };

    tracing::info!("Indexing every {}s (Ctrl-C to stop)", interval.as_secs());
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed run is retried on the next tick
                match index_once(&state).await {
                    Ok(report) => {
                        if let Err(e) = ensure_complete(&report) {
                            tracing::warn!("{}", e);
                        }
                    }
                    Err(e) => tracing::error!("Indexing run failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping periodic indexing");
                return Ok(());
            }
        }
    }
}

async fn index_once(state: &AppState) -> Result<IndexReport> {
    let records = state.catalog.list_records().await?;
    let processor = state.batch_processor()?;
    let report = processor.process(records).await?;

    println!(
        "✓ Indexed {} records in {}ms ({} failed, {} duplicates skipped)",
        report.processed,
        report.duration_ms,
        report.failed.len(),
        report.duplicates_skipped
    );
    for id in &report.failed {
        println!("  ✗ {}", id);
    }
    Ok(report)
}

fn ensure_complete(report: &IndexReport) -> Result<()> {
    if report.is_complete() {
        Ok(())
    } else {
        Err(TeamSearchError::IndexingIncomplete {
            failed: report.failed.len(),
            total: report.total(),
        })
    }
}

fn print_dry_run(records: Vec<CatalogRecord>) {
    let (documents, duplicates) = prepare_documents(records);
    for doc in &documents {
        println!("{}  {}", doc.id, doc.record.name);
        for line in doc.text.lines() {
            println!("    {}", line);
        }
    }
    println!(
        "\n{} documents ({} repeated identities skipped)",
        documents.len(),
        duplicates
    );
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = to_json(&config)?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
            println!("  Set embedding.base_url and load a catalog, then run 'teamsearch index'");
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    let mut config = Config::load_or_default(&path)?;
    if let Some(catalog_path) = &config.catalog.path {
        config.catalog.path = Some(expand_path(catalog_path)?);
    }
    config.vector_store.path = expand_path(&config.vector_store.path)?;
    Ok(config)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| TeamSearchError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| TeamSearchError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| TeamSearchError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
