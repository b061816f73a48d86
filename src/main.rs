use anyhow::{Context, Result};
use futures_util::StreamExt;
use ragline::cli::{Cli, Commands, ConfigAction};
use ragline::config::{Config, ConfigValidator};
use ragline::embedding::{build_embedder, IngestReport, Ingestor};
use ragline::generation::build_generator;
use ragline::rag::{AskRequest, RagEngine, StreamEvent};
use ragline::segment::{RowDocument, SegmentStrategy, Segmenter};
use ragline::storage::{SqliteVectorStore, VectorStore};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Config { action } => cmd_config(cli.config, cli.profile.as_deref(), action),
        command => {
            let config = load_config(cli.config, cli.profile.as_deref())?;
            let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
            runtime.block_on(run(command, config))
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "ragline=debug" } else { "ragline=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

async fn run(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Ingest { files, strategy } => cmd_ingest(&config, &files, strategy).await,
        Commands::IngestRows {
            file,
            id_field,
            question_field,
        } => cmd_ingest_rows(&config, &file, id_field.as_deref(), question_field.as_deref()).await,
        Commands::Search {
            query,
            top_k,
            min_similarity,
            json,
        } => cmd_search(&config, &query, top_k, min_similarity, json).await,
        Commands::Ask {
            question,
            top_k,
            min_similarity,
            stream,
        } => cmd_ask(&config, question, top_k, min_similarity, stream).await,
        Commands::Clear => cmd_clear(&config),
        Commands::Config { .. } => Ok(()),
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let data_dir = config.data_dir()?;
    std::fs::create_dir_all(&data_dir).with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    let store = SqliteVectorStore::open(
        &config.database_path()?,
        config.embedding.dimension,
        config.embedding.model.as_str(),
        &config.retrieval,
    )?;
    Ok(Arc::new(store))
}

fn build_engine(config: &Config) -> Result<RagEngine> {
    let embedder = build_embedder(&config.embedding, &config.retry)?;
    let generator = build_generator(&config.generation, &config.retry)?;
    let engine = RagEngine::from_config(config, embedder, open_store(config)?, generator)?;
    Ok(engine)
}

fn build_ingestor(config: &Config, strategy: Option<SegmentStrategy>) -> Result<Ingestor> {
    let mut segmenter = Segmenter::new(&config.chunking);
    if let Some(strategy) = strategy {
        segmenter = segmenter.with_strategy(strategy);
    }

    let embedder = build_embedder(&config.embedding, &config.retry)?;
    let mut ingestor = Ingestor::new(segmenter, embedder, open_store(config)?);

    if config.generation.intents_per_chunk > 0 {
        let generator = build_generator(&config.generation, &config.retry)?;
        ingestor = ingestor.with_generator(generator, config.generation.intents_per_chunk);
    }
    Ok(ingestor)
}

async fn cmd_ingest(config: &Config, files: &[PathBuf], strategy: Option<SegmentStrategy>) -> Result<()> {
    let ingestor = build_ingestor(config, strategy)?;
    let report = ingestor.ingest_files(files).await;
    print_report(&report);
    Ok(())
}

async fn cmd_ingest_rows(
    config: &Config,
    file: &Path,
    id_field: Option<&str>,
    question_field: Option<&str>,
) -> Result<()> {
    let content = std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let default_source = file.display().to_string();

    let mut rows = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Skipping line {}: invalid JSON: {}", idx + 1, e);
                continue;
            }
        };
        match RowDocument::from_json(&default_source, idx, &value, id_field, question_field) {
            Some(row) => rows.push(row),
            None => tracing::warn!("Skipping line {}: not a JSON object", idx + 1),
        }
    }

    let ingestor = build_ingestor(config, None)?;
    let report = ingestor.ingest_rows(&rows).await;
    print_report(&report);
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!(
        "✓ Ingested {} chunks from {} sources in {}ms",
        report.chunks, report.sources, report.duration_ms
    );
    if !report.failed.is_empty() {
        println!("⚠ {} sources failed:", report.failed.len());
        for (source, message) in &report.failed {
            println!("  {}: {}", source, message);
        }
    }
}

async fn cmd_search(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    min_similarity: Option<f32>,
    json: bool,
) -> Result<()> {
    let engine = build_engine(config)?;
    let response = engine.search(query, top_k, min_similarity).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.results.is_empty() {
        println!("No results ({}ms)", response.took_ms);
        return Ok(());
    }

    println!("{} results ({}ms)\n", response.results.len(), response.took_ms);
    for (rank, hit) in response.results.iter().enumerate() {
        println!(
            "{}. [{} #{}] score {:.3}, similarity {:.3}",
            rank + 1,
            hit.source_id,
            hit.position + 1,
            hit.score,
            hit.similarity
        );
        let preview: String = hit.text.chars().take(200).collect();
        println!("   {}\n", preview.replace('\n', " "));
    }
    Ok(())
}

async fn cmd_ask(
    config: &Config,
    question: String,
    top_k: Option<usize>,
    min_similarity: Option<f32>,
    stream: bool,
) -> Result<()> {
    let engine = build_engine(config)?;
    let mut request = AskRequest::new(question);
    request.top_k = top_k;
    request.min_similarity = min_similarity;

    if stream {
        let mut events = engine.ask_stream(request);
        let mut stdout = std::io::stdout();
        while let Some(event) = events.next().await {
            write!(stdout, "{}", event.to_sse())?;
            stdout.flush()?;
            if let StreamEvent::Error { message } = event {
                anyhow::bail!("Streaming answer failed: {}", message);
            }
        }
        return Ok(());
    }

    let response = engine.ask(request).await?;
    println!("{}\n", response.answer);
    if !response.sources.is_empty() {
        println!("Sources:");
        for source in &response.sources {
            let marker = if source.expanded { " (adjacent)" } else { "" };
            println!(
                "  [{} #{}] similarity {:.3}{}",
                source.source_id, source.ordinal, source.similarity, marker
            );
        }
    }
    println!("\n({}ms)", response.took_ms);
    Ok(())
}

fn cmd_clear(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let count = store.len()?;
    store.clear()?;
    println!("✓ Removed {} chunks", count);
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, profile: Option<&str>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            println!("{}", toml::to_string_pretty(&config)?);
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
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<&str>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!("Config file not found, using defaults. Run 'ragline config init' to create one.");
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    let config = match profile {
        Some(profile) => Config::load_with_profile(&path, profile)?,
        None => Config::load(&path)?,
    };
    Ok(config)
}
