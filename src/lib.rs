pub mod case_fold;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod io_utils;
pub mod mapping;
pub mod memory;
pub mod pipeline;
pub mod planner;
pub mod progress;
pub mod schema;
pub mod session;
pub mod statement;
pub mod table;
pub mod types;

use std::{env, sync::Arc, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use encoding_rs::Encoding;
use log::{LevelFilter, info, warn};

use crate::{
    cli::{Cli, Commands, LoadArgs, PlanArgs, SourceArgs, parse_delimiter},
    config::{
        BATCH_SIZE, ConfigService, DELIMITER, KEYSPACE, LayeredConfig, PROGRESS_SAMPLE_LINES,
        STATEMENT_CACHE_SIZE, STRICT_MAPPING,
    },
    error::LoadResult,
    io_utils::{DEFAULT_DELIMITER, delimited_reader, open_input, read_headers, resolve_encoding},
    mapping::{MappingConfiguration, MappingDocument, resolve},
    memory::{Catalog, MemorySessionProvider, MemoryStore},
    pipeline::{
        BatchPipeline, DEFAULT_BATCH_SIZE, DEFAULT_PROGRESS_SAMPLE_LINES,
        DEFAULT_STATEMENT_CACHE_SIZE, LoadOptions,
    },
    planner::ColumnPlan,
    schema::SchemaIntrospector,
    session::SessionProvider,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("columnar_loader", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Starting async runtime")?;
    runtime.block_on(async move {
        match cli.command {
            Commands::Load(args) => handle_load(&args).await,
            Commands::Plan(args) => handle_plan(&args).await,
        }
    })
}

/// Resolved inputs shared by every command.
struct Setup {
    keyspace: String,
    mapping: MappingConfiguration,
    delimiter: u8,
    encoding: &'static Encoding,
    provider: MemorySessionProvider,
}

impl Setup {
    fn build(source: &SourceArgs, settings: &LayeredConfig) -> Result<Self> {
        let keyspace: String = settings.require(KEYSPACE)?;
        let strict = settings.get_or(STRICT_MAPPING, false)?;
        let delimiter = match source.delimiter {
            Some(delimiter) => delimiter,
            None => match settings.lookup(DELIMITER) {
                Some(raw) => parse_delimiter(raw.trim())
                    .map_err(|err| anyhow::anyhow!("Invalid delimiter setting '{raw}': {err}"))?,
                None => DEFAULT_DELIMITER,
            },
        };
        let encoding = resolve_encoding(source.input_encoding.as_deref())?;

        let document = MappingDocument::load(&source.mapping)?;
        let mapping = resolve(&document, &source.overrides(strict))
            .with_context(|| format!("Resolving mapping {:?}", source.mapping))?;

        let catalog = Catalog::load(&source.catalog)?;
        let provider = MemorySessionProvider::new(Arc::new(MemoryStore::new(catalog)));
        Ok(Self {
            keyspace,
            mapping,
            delimiter,
            encoding,
            provider,
        })
    }
}

fn settings(source: &SourceArgs) -> Result<LayeredConfig> {
    let settings = LayeredConfig::new()
        .with_cli(KEYSPACE, source.keyspace.as_ref())
        .with_cli(STRICT_MAPPING, source.strict_mapping);
    match &source.config {
        Some(path) => settings.with_file(path),
        None => Ok(settings),
    }
}

async fn handle_load(args: &LoadArgs) -> Result<()> {
    let source = &args.source;
    let settings = settings(source)?
        .with_cli(BATCH_SIZE, args.batch_size)
        .with_cli(STATEMENT_CACHE_SIZE, args.statement_cache)
        .with_cli(PROGRESS_SAMPLE_LINES, args.progress_sample);
    let setup = Setup::build(source, &settings)?;

    let mut options = LoadOptions::new(setup.keyspace.clone());
    options.batch_size = settings.get_or(BATCH_SIZE, DEFAULT_BATCH_SIZE)?;
    options.statement_cache_size =
        settings.get_or(STATEMENT_CACHE_SIZE, DEFAULT_STATEMENT_CACHE_SIZE)?;
    options.progress_sample_lines =
        settings.get_or(PROGRESS_SAMPLE_LINES, DEFAULT_PROGRESS_SAMPLE_LINES)?;
    options.delimiter = setup.delimiter;
    options.encoding = setup.encoding;
    info!(
        "Loading '{}' into {}.{} with delimiter '{}' and batch size {}",
        source.input.display(),
        setup.keyspace,
        setup.mapping.table(),
        printable_delimiter(setup.delimiter),
        options.batch_size
    );

    setup.provider.start().context("Starting store session")?;
    let session = setup.provider.session()?;
    let mut pipeline = BatchPipeline::new(session, setup.mapping, options);
    let outcome = tokio::select! {
        outcome = pipeline.run(&source.input) => outcome,
        _ = tokio::signal::ctrl_c() => {
            setup.provider.stop();
            bail!("Interrupted; outstanding writes were cancelled");
        }
    };
    setup.provider.stop();
    let summary = outcome.with_context(|| format!("Loading {:?}", source.input))?;
    for (header, column) in summary.plan.auto_matched() {
        info!("Header '{header}' was loaded into column '{column}' by name");
    }
    Ok(())
}

async fn handle_plan(args: &PlanArgs) -> Result<()> {
    let source = &args.source;
    let settings = settings(source)?;
    let setup = Setup::build(source, &settings)?;

    let input =
        open_input(&source.input).with_context(|| format!("Opening input {:?}", source.input))?;
    let mut reader = delimited_reader(input, setup.delimiter);
    let Some(headers) = read_headers(&mut reader, setup.encoding)? else {
        bail!("Input {:?} has no header line", source.input);
    };

    setup.provider.start().context("Starting store session")?;
    let session = setup.provider.session()?;
    let planned: LoadResult<ColumnPlan> = async {
        let types = SchemaIntrospector::new(session.as_ref())
            .require_table(&setup.keyspace, setup.mapping.table())
            .await?;
        planner::plan(&headers, &setup.mapping, &types)
    }
    .await;
    setup.provider.stop();
    let plan = planned.with_context(|| {
        format!(
            "Planning {}.{} for {:?}",
            setup.keyspace,
            setup.mapping.table(),
            source.input
        )
    })?;

    print!("{}", table::render_plan(&plan));
    for header in plan.skipped_headers() {
        warn!("Header '{header}' matches no column and will not be loaded");
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
