//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tabcontext_collector::TabFilter;
use tabcontext_core::{
    ClassifierClient, DashboardClient, DashboardRequest, Pipeline, PipelineService,
    ProgressReporter, StateReport, parse_request,
};
use tabcontext_shared::{
    AppConfig, Cluster, DomainResult, api_token_from_env, init_config, load_config,
    load_config_from,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::backends::{Host, Store};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// TabContext: group open browser tabs and infer what you are working on.
#[derive(Parser)]
#[command(
    name = "tabcontext",
    version,
    about = "Cluster open browser tabs by topic and resolve the working context behind them.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.tabcontext/tabcontext.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// API token for the classification service (defaults to the env var named in config).
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Read tabs from a JSON snapshot instead of a live browser.
    #[arg(long, global = true)]
    pub tabs_file: Option<PathBuf>,

    /// Keep session state in memory only.
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Collect open tabs and group them into clusters.
    Cluster,

    /// Pick a cluster and resolve its domain.
    Select {
        /// Cluster ID as shown by `tabcontext clusters`.
        cluster_id: i64,

        /// What you want to do with these tabs.
        #[arg(short, long, default_value = "")]
        prompt: String,
    },

    /// Show the last computed clusters.
    Clusters,

    /// Show the last resolved domain.
    Domain,

    /// Show where the pipeline stands.
    State,

    /// Send the resolved domain to the dashboard generator.
    Dashboard,

    /// Answer JSON-lines pipeline requests on stdin.
    Serve,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "tabcontext=info",
        1 => "tabcontext=debug",
        _ => "tabcontext=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()).await,
        };
    }

    let config = match cli.config.as_deref() {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let token = cli.token.clone().or_else(|| api_token_from_env(&config));

    let ctx = Context {
        config,
        token,
        tabs_file: cli.tabs_file,
        ephemeral: cli.ephemeral,
        json: cli.json,
    };

    match cli.command {
        Command::Cluster => cmd_cluster(&ctx).await,
        Command::Select { cluster_id, prompt } => cmd_select(&ctx, cluster_id, &prompt).await,
        Command::Clusters => cmd_clusters(&ctx).await,
        Command::Domain => cmd_domain(&ctx).await,
        Command::State => cmd_state(&ctx).await,
        Command::Dashboard => cmd_dashboard(&ctx).await,
        Command::Serve => cmd_serve(&ctx).await,
        Command::Config { .. } => Ok(()),
    }
}

/// Resolved settings shared by every pipeline command.
struct Context {
    config: AppConfig,
    token: Option<String>,
    tabs_file: Option<PathBuf>,
    ephemeral: bool,
    json: bool,
}

impl Context {
    async fn pipeline(&self, writable: bool) -> Result<Pipeline<Host, Store>> {
        let host = Host::from_args(&self.config, self.tabs_file.as_deref())?;
        let store = if writable {
            Store::open(&self.config, self.ephemeral).await?
        } else {
            Store::open_for_reading(&self.config).await?
        };
        let classifier = ClassifierClient::new(&self.config.classifier)?;
        let filter = TabFilter::from_config(&self.config.collector);
        Ok(Pipeline::new(host, store, classifier, filter))
    }
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_cluster(ctx: &Context) -> Result<()> {
    if ctx.ephemeral {
        warn!("--ephemeral discards clusters when this command exits");
    }
    let pipeline = ctx.pipeline(true).await?;
    let reporter = CliProgress::new();

    info!(snapshot = ctx.tabs_file.is_some(), "clustering open tabs");
    let clusters = pipeline.cluster_tabs(ctx.token.as_deref(), &reporter).await;
    reporter.finish();

    let clusters = clusters?;
    if ctx.json {
        return print_json(&clusters);
    }
    print_clusters(&clusters);
    println!("  Pick one with: tabcontext select <cluster_id> [--prompt \"...\"]");
    println!();
    Ok(())
}

async fn cmd_select(ctx: &Context, cluster_id: i64, prompt: &str) -> Result<()> {
    let pipeline = ctx.pipeline(true).await?;
    let reporter = CliProgress::new();

    let result = pipeline
        .select_cluster(ctx.token.as_deref(), Some(cluster_id), prompt, &reporter)
        .await;
    reporter.finish();

    let result = result?;
    if ctx.json {
        return print_json(&result);
    }
    print_domain_result(&result);
    Ok(())
}

async fn cmd_clusters(ctx: &Context) -> Result<()> {
    let pipeline = ctx.pipeline(false).await?;
    let clusters = pipeline.clusters().await?;

    if ctx.json {
        return print_json(&clusters);
    }
    match clusters {
        Some(clusters) => print_clusters(&clusters),
        None => println!("No clusters yet. Run `tabcontext cluster` first."),
    }
    Ok(())
}

async fn cmd_domain(ctx: &Context) -> Result<()> {
    let pipeline = ctx.pipeline(false).await?;
    let result = pipeline.domain_result().await?;

    if ctx.json {
        return print_json(&result);
    }
    match result {
        Some(result) => print_domain_result(&result),
        None => println!("No domain resolved yet. Run `tabcontext select <cluster_id>` first."),
    }
    Ok(())
}

async fn cmd_state(ctx: &Context) -> Result<()> {
    let pipeline = ctx.pipeline(false).await?;
    let report = pipeline.state().await?;

    if ctx.json {
        return print_json(&report);
    }
    print_state(&report);
    Ok(())
}

async fn cmd_dashboard(ctx: &Context) -> Result<()> {
    let pipeline = ctx.pipeline(false).await?;
    let result = pipeline
        .domain_result()
        .await?
        .ok_or_else(|| eyre!("no domain resolved yet; run `tabcontext select <cluster_id>` first"))?;

    let client = DashboardClient::new(&ctx.config.dashboard)?;
    let reporter = CliProgress::new();
    reporter.phase("Generating dashboard");
    let response = client.generate(&DashboardRequest::from_result(&result)).await;
    reporter.finish();

    let response = response?;
    if ctx.json {
        return print_json(&response);
    }
    if !response.success {
        return Err(eyre!(
            "dashboard generation failed: {}",
            response.error.as_deref().unwrap_or("unknown error")
        ));
    }

    println!();
    println!("  Dashboard generated!");
    println!("  Domain:   {}", response.domain);
    println!("  Template: {}", response.selected_template);
    if let Some(url) = &response.sandbox_preview_url {
        println!("  Preview:  {url}");
    }
    if let Some(url) = &response.sandbox_embed_url {
        println!("  Embed:    {url}");
    }
    println!();
    Ok(())
}

/// JSON-lines server: one request per stdin line, one response per stdout line.
async fn cmd_serve(ctx: &Context) -> Result<()> {
    let pipeline = ctx.pipeline(true).await?;
    let handle = PipelineService::spawn(pipeline);

    info!(ephemeral = ctx.ephemeral, "serving pipeline requests on stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let mut request: Value = serde_json::from_str(&line).unwrap_or(Value::Null);
        // The configured credential applies when a request carries none
        if let (Some(obj), Some(token)) = (request.as_object_mut(), ctx.token.as_ref()) {
            obj.entry("token").or_insert_with(|| Value::String(token.clone()));
        }
        let raw = if request.is_null() { line } else { request.to_string() };

        let response = match parse_request(&raw) {
            Ok(request) => handle.answer(request).await,
            Err(response) => response,
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_clusters(clusters: &[Cluster]) {
    println!();
    for cluster in clusters {
        println!(
            "  [{}] {} ({}, {} tabs)",
            cluster.cluster_id,
            cluster.cluster_name,
            cluster.domain,
            cluster.tabs.len()
        );
        println!("      {}", cluster.summary);
        for tab in &cluster.tabs {
            println!("      - {}  {}", tab.title, tab.url);
        }
        println!();
    }
}

fn print_domain_result(result: &DomainResult) {
    println!();
    println!("  Domain:  {}", result.domain);
    println!("  Summary: {}", result.summary);
    if !result.user_prompt.is_empty() {
        println!("  Prompt:  {}", result.user_prompt);
    }
    println!("  Tabs:    {}", result.tabs.len());
    println!("  At:      {}", result.timestamp.to_rfc3339());
    println!();
}

fn print_state(report: &StateReport) {
    let state = serde_json::to_value(report.state)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default();

    println!();
    println!("  State:        {state}");
    println!("  Clusters:     {}", report.cluster_count);
    if let Some(time) = report.last_cluster_time {
        println!("  Clustered at: {}", time.to_rfc3339());
    }
    if let Some(domain) = report.domain {
        println!("  Domain:       {domain}");
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn tabs_collected(&self, count: usize) {
        self.spinner.set_message(format!("Collected {count} tabs"));
    }

    fn done(&self, message: &str) {
        self.spinner.finish_and_clear();
        info!(outcome = message, "stage complete");
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config: AppConfig = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
