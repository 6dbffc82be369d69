use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nmdc_api::{
    ClientConfig, DEFAULT_BASE_URL, DEFAULT_JOB_PAGE_SIZE, DEFAULT_OBJECT_PAGE_SIZE,
    DEFAULT_OPERATION_PAGE_SIZE, NmdcClient, default_credentials_path,
};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "nmdc-cli",
    version,
    about = "Command-line client for the NMDC runtime API",
    arg_required_else_help = true
)]
struct Cli {
    /// Base URL for the API.
    #[arg(long, env = "NMDC_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Credentials JSON with `client_id` and `client_secret`.
    /// Defaults to `~/.nmdc-creds.json`.
    #[arg(long, env = "NMDC_CREDENTIALS", value_name = "PATH")]
    credentials: Option<PathBuf>,

    /// Emit compact JSON instead of pretty-printed output.
    #[arg(long)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
#[command(rename_all = "snake_case")]
enum Command {
    /// Replace the type list of an object.
    SetType { object: String, kind: String },
    /// Mark operations as not done.
    Undo {
        #[arg(required = true)]
        operations: Vec<String>,
    },
    /// Show one job.
    GetJob { id: String },
    /// Try to claim a job.
    ClaimJob { id: String },
    /// List jobs, optionally filtered by a JSON document.
    ListJobs(ListArgs),
    /// List operations, optionally filtered by a JSON document.
    ListOps(ListArgs),
    /// List objects, optionally filtered by a JSON document.
    ListObjs(ListArgs),
    /// Show one object with its description decoded (any `get_obj*` spelling).
    GetObj { id: String },
    /// Touch an object's `created_time` to trigger reprocessing.
    BumpTime { id: String },
    /// Show one operation (any `get_op*` spelling).
    GetOp { id: String },
    /// List operations whose `metadata.site_id` matches.
    #[command(name = "dumpops")]
    DumpOps { site_id: String },
    /// Mint new identifiers.
    Mint {
        shoulder: String,
        #[arg(allow_negative_numbers = true)]
        count: i64,
        /// Identifier namespace.
        #[arg(long, default_value = "nmdc")]
        namespace: String,
    },
    /// Register a local file as an object served from URL.
    #[command(name = "mkobj")]
    MkObj {
        path: PathBuf,
        description: String,
        url: String,
    },
    /// List jobs, filtered on a single key/value pair when both are given.
    #[command(name = "dumpjobs")]
    DumpJobs {
        key: Option<String>,
        value: Option<String>,
    },
}

#[derive(Debug, Args)]
struct ListArgs {
    /// JSON filter document, for example '{"claimed": false}'.
    filter: Option<String>,

    /// Page size requested from the server.
    #[arg(long)]
    page_size: Option<u32>,
}

/// Entry point for the CLI.
///
/// Builds the client (fetching a token when credentials exist), dispatches
/// the subcommand, and prints JSON output.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_from(normalize_command(std::env::args()));

    let config = ClientConfig {
        base_url: cli.base_url.clone(),
        credentials_path: cli.credentials.clone().or_else(default_credentials_path),
    };
    let client = NmdcClient::connect(config)
        .with_context(|| format!("failed to create client for '{}'", cli.base_url))?;

    for output in run(&client, &cli.command)? {
        print_json(&output, cli.compact).context("failed to print JSON output")?;
    }
    Ok(())
}

/// Runs one subcommand; most produce a single document, `undo` one per operation.
fn run(client: &NmdcClient, command: &Command) -> Result<Vec<Value>> {
    let output = match command {
        Command::SetType { object, kind } => client
            .set_type(object, kind)
            .with_context(|| format!("failed to set type of '{object}'"))?,
        Command::Undo { operations } => {
            return operations
                .iter()
                .map(|id| {
                    client
                        .update_op(id, Some(false), None, None)
                        .map(|updated| updated.unwrap_or(Value::Null))
                        .with_context(|| format!("failed to undo operation '{id}'"))
                })
                .collect();
        }
        Command::GetJob { id } => client
            .get_job(id)
            .with_context(|| format!("failed to fetch job '{id}'"))?,
        Command::ClaimJob { id } => client
            .claim_job(id)
            .with_context(|| format!("failed to claim job '{id}'"))?,
        Command::ListJobs(args) => {
            let filter = parse_filter(args.filter.as_deref())?;
            let jobs = client
                .list_jobs(
                    filter.as_ref(),
                    args.page_size.unwrap_or(DEFAULT_JOB_PAGE_SIZE),
                )
                .context("failed to list jobs")?;
            Value::Array(jobs)
        }
        Command::ListOps(args) => {
            let filter = parse_filter(args.filter.as_deref())?;
            let ops = client
                .list_ops(
                    filter.as_ref(),
                    args.page_size.unwrap_or(DEFAULT_OPERATION_PAGE_SIZE),
                )
                .context("failed to list operations")?;
            Value::Array(ops)
        }
        Command::ListObjs(args) => {
            let filter = parse_filter(args.filter.as_deref())?;
            let objects = client
                .list_objs(
                    filter.as_ref(),
                    args.page_size.unwrap_or(DEFAULT_OBJECT_PAGE_SIZE),
                )
                .context("failed to list objects")?;
            Value::Array(objects)
        }
        Command::GetObj { id } => client
            .get_object(id, true)
            .with_context(|| format!("failed to fetch object '{id}'"))?,
        Command::BumpTime { id } => client
            .bump_time(id)
            .with_context(|| format!("failed to bump time of '{id}'"))?,
        Command::GetOp { id } => client
            .get_op(id)
            .with_context(|| format!("failed to fetch operation '{id}'"))?,
        Command::DumpOps { site_id } => {
            let filter = json!({ "metadata.site_id": site_id });
            let ops = client
                .list_ops(Some(&filter), DEFAULT_OPERATION_PAGE_SIZE)
                .with_context(|| format!("failed to list operations for site '{site_id}'"))?;
            Value::Array(ops)
        }
        Command::Mint {
            shoulder,
            count,
            namespace,
        } => client
            .mint(namespace, shoulder, *count)
            .with_context(|| format!("failed to mint {count} '{shoulder}' identifiers"))?,
        Command::MkObj {
            path,
            description,
            url,
        } => client
            .create_object(path, description, url)
            .with_context(|| format!("failed to create object for '{}'", path.display()))?,
        Command::DumpJobs { key, value } => {
            let filter = match (key, value) {
                (Some(key), Some(value)) => Some(json!({ key.as_str(): value })),
                _ => None,
            };
            let jobs = client
                .list_jobs(filter.as_ref(), DEFAULT_JOB_PAGE_SIZE)
                .context("failed to list jobs")?;
            Value::Array(jobs)
        }
    };
    Ok(vec![output])
}

/// Rewrites `get_obj*` and `get_op*` spellings (`get_object`, `get_ops`, ...)
/// to their canonical subcommand names.
fn normalize_command(args: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut args: Vec<String> = args.into_iter().collect();
    let mut index = 1;
    while index < args.len() {
        let arg = &args[index];
        if arg == "--base-url" || arg == "--credentials" {
            index += 2;
            continue;
        }
        if arg.starts_with('-') {
            index += 1;
            continue;
        }
        if arg.starts_with("get_obj") {
            args[index] = "get_obj".to_owned();
        } else if arg.starts_with("get_op") {
            args[index] = "get_op".to_owned();
        }
        break;
    }
    args
}

fn parse_filter(raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|text| {
        serde_json::from_str(text).with_context(|| format!("filter is not valid JSON: '{text}'"))
    })
    .transpose()
}

/// Prints a JSON value either compact or pretty-formatted.
fn print_json(value: &Value, compact: bool) -> Result<()> {
    if compact {
        println!(
            "{}",
            serde_json::to_string(value).context("Failed to render JSON")?
        );
    } else {
        println!(
            "{}",
            serde_json::to_string_pretty(value).context("Failed to render JSON")?
        );
    }
    Ok(())
}
