//! # DataObjects CLI
//!
//! Command-line front end over an object context. Configurations come from
//! a store file or directory, data from a JSON fixture served by the
//! in-memory engine.
//!
//! ## Commands
//!
//! - `objects` - List the configured objects
//! - `describe` - Print the descriptor of one object
//! - `fetch` - Run one page request, or fetch one form record
//! - `check` - Build every configured object and report failures
//!

mod output;

pub use output::{CheckResult, OutputFormat, Report};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use dataobjects_core::{ObjectKind, Persistable};
use dataobjects_engine::{MemoryEngine, MemoryFixture, ObjectContext, PageRequest};
use dataobjects_model::{ConfigStore, MemoryConfigStore};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// CLI version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI name
pub const NAME: &str = env!("CARGO_PKG_NAME");

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "dataobjects", author, version)]
#[command(about = "Inspect and query configured list and form objects")]
pub struct Cli {
    /// Object configuration: a JSON or TOML file, or a directory of them
    #[arg(long, short, global = true, env = "DATAOBJECTS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Log debug output (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the configured objects
    Objects,

    /// Print the descriptor of one object
    Describe {
        /// Object type (`list` or `form`)
        kind: String,

        /// Object ID
        object_id: String,

        /// Data fixture naming the current user
        #[arg(long)]
        data: Option<PathBuf>,
    },

    /// Run one page request, or fetch one form record
    Fetch(FetchArgs),

    /// Build every configured object and report failures
    Check {
        /// Data fixture naming the current user
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Object type (`list` or `form`)
    pub kind: String,

    /// Object ID
    pub object_id: String,

    /// JSON data fixture served by the in-memory engine
    #[arg(long)]
    pub data: PathBuf,

    /// Record to fetch (forms)
    #[arg(long)]
    pub id: Option<String>,

    /// First row
    #[arg(long, default_value_t = 0)]
    pub start: u64,

    /// Page length; -1 for every row
    #[arg(long, allow_negative_numbers = true)]
    pub length: Option<i64>,

    /// Global search term
    #[arg(long)]
    pub search: Option<String>,

    /// Column search as FIELD=VALUE, repeatable
    #[arg(long = "filter", value_parser = parse_column_search)]
    pub filters: Vec<(String, String)>,

    /// Ordering as FIELD[:asc|desc], repeatable
    #[arg(long)]
    pub order: Vec<String>,

    /// Draw counter echoed in the page
    #[arg(long, default_value_t = 1)]
    pub draw: u64,
}

impl FetchArgs {
    fn page_request(&self) -> PageRequest {
        let mut request = PageRequest {
            draw: self.draw,
            start: Some(self.start),
            length: self.length,
            ..PageRequest::default()
        };
        for (field, value) in &self.filters {
            request = request.search_column(field, value);
        }
        if let Some(term) = &self.search {
            request = request.search_all(term);
        }
        for spec in &self.order {
            let (field, dir) = spec.split_once(':').unwrap_or((spec, "asc"));
            request = request.order_by(field, dir);
        }
        request
    }
}

fn parse_column_search(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((field, value)) if !field.is_empty() => Ok((field.to_string(), value.to_string())),
        _ => Err(format!("expected FIELD=VALUE, got '{raw}'")),
    }
}

/// Record IDs are numbers when they parse as JSON numbers
fn parse_record_id(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Number(_)) => value,
        _ => Value::String(raw.to_string()),
    }
}

impl Cli {
    /// Log filter from `RUST_LOG`, falling back to `--verbose`
    pub fn log_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(if self.verbose { "debug" } else { "warn" }))
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Execute the parsed command, print its report and map it to an exit code
pub fn run(cli: &Cli) -> ExitCode {
    match execute(cli) {
        Ok(report) => {
            println!("{}", report.output);
            if report.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Execute the parsed command
pub fn execute(cli: &Cli) -> Result<Report> {
    let store = load_store(cli.config.as_deref())?;
    debug!(objects = store.len(), "Loaded configuration store");

    match &cli.command {
        Command::Objects => Ok(output::objects(&store.objects(), cli.format)),
        Command::Describe {
            kind,
            object_id,
            data,
        } => {
            let mut context = build_context(store, data.as_deref())?;
            context.build_object(kind, object_id, &Value::Null)?;
            let descriptor = context.get_object_descriptor(object_id)?;
            Ok(output::descriptor(&descriptor, cli.format))
        }
        Command::Fetch(args) => fetch(store, args, cli.format),
        Command::Check { data } => check(store, data.as_deref(), cli.format),
    }
}

fn load_store(path: Option<&Path>) -> Result<MemoryConfigStore> {
    let path = path.context("no configuration given, pass --config or set DATAOBJECTS_CONFIG")?;
    MemoryConfigStore::load(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn build_context(
    store: MemoryConfigStore,
    data: Option<&Path>,
) -> Result<ObjectContext<MemoryConfigStore, MemoryEngine>> {
    let Some(path) = data else {
        return Ok(ObjectContext::new(store, MemoryEngine::new()));
    };
    let fixture = MemoryFixture::load_from_file(path)
        .with_context(|| format!("failed to load data fixture {}", path.display()))?;
    let engine = MemoryEngine::from_fixture(&fixture)?;
    let user = fixture
        .current_user
        .as_ref()
        .map(|user| engine.current_user(user))
        .transpose()?;

    let context = ObjectContext::new(store, engine);
    Ok(match user {
        Some(user) => {
            info!(model = %user.model, "Running as fixture user");
            context.with_user(user)
        }
        None => context,
    })
}

fn fetch(store: MemoryConfigStore, args: &FetchArgs, format: OutputFormat) -> Result<Report> {
    let kind: ObjectKind = args.kind.parse()?;
    let mut context = build_context(store, Some(&args.data))?;
    context.build_object(&args.kind, &args.object_id, &Value::Null)?;

    match kind {
        ObjectKind::Form => {
            let id = args.id.as_deref().map(parse_record_id);
            let values = context.fetch_data_set(&args.object_id, id)?;
            Ok(output::record(&values, format))
        }
        ObjectKind::List => {
            let columns: Vec<String> = context
                .object(&args.object_id)?
                .registry
                .user_fields()
                .map(|field| field.id.clone())
                .collect();
            let page = context.fetch_results(&args.object_id, &args.page_request())?;
            Ok(output::page(&columns, &page, format))
        }
    }
}

fn check(store: MemoryConfigStore, data: Option<&Path>, format: OutputFormat) -> Result<Report> {
    let objects = store.objects();
    let mut context = build_context(store, data)?;
    let results: Vec<CheckResult> = objects
        .into_iter()
        .map(|(kind, object_id)| {
            let error = context
                .build_object(kind.as_str(), &object_id, &Value::Null)
                .err()
                .map(|err| err.to_string());
            CheckResult {
                kind,
                object_id,
                error,
            }
        })
        .collect();
    Ok(output::check(&results, format))
}
