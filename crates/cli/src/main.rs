//! CronJob Guardian CLI
//!
//! Checks schedules, maintenance windows, suggested-fix patterns, channels
//! and whole policy files offline, and queries a running guardian for
//! alerts and SLA snapshots.

mod client;
mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{alerts, channel, pattern, policy, schedule, sla, window};
use guardian_lib::models::FailureContext;
use std::path::PathBuf;

/// CronJob Guardian CLI
#[derive(Parser)]
#[command(name = "cgctl")]
#[command(author, version, about = "CLI for CronJob Guardian", long_about = None)]
pub struct Cli {
    /// Guardian API URL (can also be set via CGCTL_API_URL env var)
    #[arg(long, env = "CGCTL_API_URL")]
    pub api_url: Option<String>,

    /// Policy file with monitors, channels and jobs
    #[arg(long, short, env = "CGCTL_POLICY")]
    pub policy: Option<PathBuf>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect cron schedules
    #[command(subcommand)]
    Schedule(ScheduleCommands),

    /// Check maintenance windows
    #[command(subcommand)]
    Window(WindowCommands),

    /// Test suggested-fix patterns against a failure
    #[command(subcommand)]
    Pattern(PatternCommands),

    /// Test notification channels
    #[command(subcommand)]
    Channel(ChannelCommands),

    /// Validate policy files
    #[command(subcommand)]
    Policy(PolicyCommands),

    /// Query alerts on a running guardian
    #[command(subcommand)]
    Alerts(AlertsCommands),

    /// Query SLA snapshots on a running guardian
    #[command(subcommand)]
    Sla(SlaCommands),
}

#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// Show the period, dead-man deadline and next runs of a schedule
    Interval {
        /// Cron expression, e.g. "0 */6 * * *"
        schedule: String,

        /// IANA timezone the schedule is evaluated in
        #[arg(long, short = 'z')]
        timezone: Option<String>,

        /// Missed runs tolerated before the switch triggers
        #[arg(long, default_value_t = 1)]
        threshold: u32,

        /// Grace period added to the deadline (e.g. 30m, 1h)
        #[arg(long, default_value = "1h")]
        buffer: String,

        /// Number of upcoming runs to list
        #[arg(long, default_value_t = 5)]
        next: usize,
    },
}

#[derive(Subcommand)]
pub enum WindowCommands {
    /// Show which windows are open at an instant
    Check {
        /// Monitor whose windows to check (format: namespace/name)
        #[arg(long, short, conflicts_with = "schedule")]
        monitor: Option<String>,

        /// Ad-hoc window start schedule
        #[arg(long, requires = "duration")]
        schedule: Option<String>,

        /// Ad-hoc window length (e.g. 2h)
        #[arg(long)]
        duration: Option<String>,

        /// Timezone of the ad-hoc window
        #[arg(long, short = 'z')]
        timezone: Option<String>,

        /// Instant to check, RFC 3339 (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum PatternCommands {
    /// Show which pattern would produce the suggestion for a failure
    Test {
        /// Include custom patterns of this monitor (format: namespace/name)
        #[arg(long, short)]
        monitor: Option<String>,

        #[arg(long, short, default_value = "default")]
        namespace: String,

        #[arg(long, default_value = "job")]
        job: String,

        #[arg(long)]
        exit_code: Option<i32>,

        /// Termination reason, e.g. OOMKilled
        #[arg(long)]
        reason: Option<String>,

        /// Log excerpt
        #[arg(long, conflicts_with = "logs_file")]
        logs: Option<String>,

        /// Read the log excerpt from a file
        #[arg(long)]
        logs_file: Option<PathBuf>,

        /// Event message (repeatable)
        #[arg(long = "event")]
        events: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum ChannelCommands {
    /// Send a test notification through a channel from the policy
    Test {
        /// Channel name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Check schedules, patterns, windows, channels and references
    Validate,
}

#[derive(Subcommand)]
pub enum AlertsCommands {
    /// List active alerts
    List {
        #[command(flatten)]
        filter: AlertFilterArgs,
    },

    /// List resolved alerts
    History {
        #[command(flatten)]
        filter: AlertFilterArgs,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[derive(clap::Args)]
pub struct AlertFilterArgs {
    /// Filter by namespace
    #[arg(long, short)]
    namespace: Option<String>,

    /// Filter by job name (needs --namespace)
    #[arg(long, short, requires = "namespace")]
    job: Option<String>,

    /// Filter by alert type (JobFailed, DeadManTriggered, SLABreached, DurationRegression)
    #[arg(long = "type")]
    alert_type: Option<String>,

    /// Filter by severity (critical, warning, info)
    #[arg(long)]
    severity: Option<String>,
}

impl AlertFilterArgs {
    fn into_query(self, offset: Option<usize>, limit: Option<usize>) -> client::AlertQuery {
        client::AlertQuery {
            namespace: self.namespace,
            name: self.job,
            alert_type: self.alert_type,
            severity: self.severity,
            offset,
            limit,
        }
    }
}

#[derive(Subcommand)]
pub enum SlaCommands {
    /// Show the latest SLA figures of a job
    Show {
        /// Job (format: namespace/name)
        job: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let format = cli
        .format
        .or_else(|| config.default_format.as_deref().and_then(output::OutputFormat::parse))
        .unwrap_or_default();
    let policy_path = cli.policy.or(config.default_policy);
    let api_url = cli
        .api_url
        .or(config.api_url)
        .unwrap_or_else(|| "http://localhost:8080".to_string());

    match cli.command {
        Commands::Schedule(ScheduleCommands::Interval {
            schedule,
            timezone,
            threshold,
            buffer,
            next,
        }) => {
            schedule::show_interval(&schedule, timezone.as_deref(), threshold, &buffer, next, format)?;
        }
        Commands::Window(WindowCommands::Check {
            monitor,
            schedule,
            duration,
            timezone,
            at,
        }) => {
            let at = commands::parse_instant(at.as_deref())?;
            match (schedule, monitor) {
                (Some(schedule), _) => {
                    let duration = duration.context("--schedule needs --duration")?;
                    let source = window::WindowSource::AdHoc {
                        schedule: &schedule,
                        duration: &duration,
                        timezone: timezone.as_deref(),
                    };
                    window::check(&source, at, format)?;
                }
                (None, Some(monitor)) => {
                    let policy = commands::load_policy(policy_path.as_deref())?;
                    let source = window::WindowSource::Monitor {
                        policy: &policy,
                        monitor: &monitor,
                    };
                    window::check(&source, at, format)?;
                }
                (None, None) => anyhow::bail!("Pass --monitor or --schedule/--duration"),
            }
        }
        Commands::Pattern(PatternCommands::Test {
            monitor,
            namespace,
            job,
            exit_code,
            reason,
            logs,
            logs_file,
            events,
        }) => {
            let logs = match logs_file {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                None => logs,
            };
            let policy = match (&monitor, policy_path.as_deref()) {
                (Some(_), path) => Some(commands::load_policy(path)?),
                (None, _) => None,
            };
            let custom = pattern::custom_patterns(policy.as_ref(), monitor.as_deref())?;
            let sample = FailureContext {
                namespace,
                job_name: job,
                job_run: None,
                exit_code,
                reason,
                logs,
                events,
            };
            pattern::test(&custom, &sample, format)?;
        }
        Commands::Channel(ChannelCommands::Test { name }) => {
            let policy = commands::load_policy(policy_path.as_deref())?;
            channel::test(&policy, &name, format).await?;
        }
        Commands::Policy(PolicyCommands::Validate) => {
            let policy = commands::load_policy(policy_path.as_deref())?;
            policy::validate(&policy, format)?;
        }
        Commands::Alerts(cmd) => {
            let client = client::ApiClient::new(&api_url)?;
            match cmd {
                AlertsCommands::List { filter } => {
                    alerts::list(&client, &filter.into_query(None, None), format).await?;
                }
                AlertsCommands::History {
                    filter,
                    offset,
                    limit,
                } => {
                    let query = filter.into_query(Some(offset), Some(limit));
                    alerts::history(&client, &query, format).await?;
                }
            }
        }
        Commands::Sla(SlaCommands::Show { job }) => {
            let client = client::ApiClient::new(&api_url)?;
            sla::show(&client, &job, format).await?;
        }
    }

    Ok(())
}
