//! claw-eventwatch - Clawbernetes cluster event notifier
//!
//! Watches every event in the cluster and posts the actionable ones to Slack.
//! Exits non-zero when the watch cannot be opened or ends; restarting is left
//! to the supervisor.

use clap::{Parser, Subcommand};
use claw_events::{ChangeKind, Classifier, Event};
use claw_eventwatch::{
    ChatNotifier, ConfigArgs, Dispatcher, KubeConfig, KubeEventSource, LogTransport, Notifier,
    SlackTransport, WatcherConfig,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is unset or empty.
const DEFAULT_LOG_FILTER: &str = "claw_eventwatch=info";

#[derive(Parser)]
#[command(name = "claw-eventwatch")]
#[command(about = "Clawbernetes cluster event notifier")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch cluster events and send notifications
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// Log notifications instead of posting them to Slack
        #[arg(long)]
        dry_run: bool,
    },

    /// Classify a single event and print the verdict
    Classify {
        #[command(flatten)]
        config: ConfigArgs,

        /// Watch change kind (added, modified, deleted)
        #[arg(long, default_value = "modified")]
        kind: ChangeKind,

        /// Event reason
        #[arg(long)]
        reason: String,

        /// Recurrence count
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Source component
        #[arg(long, default_value = "")]
        component: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());
    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    match cli.command {
        Commands::Run { config, dry_run } => run_watcher(config, dry_run).await,
        Commands::Classify {
            config,
            kind,
            reason,
            count,
            component,
        } => classify(&config, kind, reason, count, component),
    }
}

/// Builds the log filter from `RUST_LOG`, falling back to the default only
/// when it is unset or unparsable.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

async fn run_watcher(args: ConfigArgs, dry_run: bool) -> anyhow::Result<()> {
    let config = WatcherConfig::from_args(args, dry_run)?;
    info!(
        environment = %config.notifier.environment,
        threshold = ?config.notifier.threshold,
        noisy = ?config.classifier.noisy_components,
        escalation = config.classifier.backoff_escalation_count,
        dry_run = config.is_dry_run(),
        "starting claw-eventwatch"
    );

    let kube = KubeConfig::load(&config.kube)?;
    let source = KubeEventSource::connect(&kube).await?;
    let classifier = Classifier::new(config.classifier.clone());

    let err = match config.slack.clone() {
        Some(slack) => {
            let notifier = ChatNotifier::new(config.notifier.clone(), SlackTransport::new(slack)?);
            dispatch(source, classifier, notifier, &config).await
        }
        None => {
            let notifier = ChatNotifier::new(config.notifier.clone(), LogTransport::default());
            dispatch(source, classifier, notifier, &config).await
        }
    };

    error!(error = %err, "event watch terminated");
    Err(err.into())
}

async fn dispatch<N: Notifier>(
    source: KubeEventSource,
    classifier: Classifier,
    notifier: N,
    config: &WatcherConfig,
) -> claw_eventwatch::WatchError {
    Dispatcher::new(source, classifier, notifier)
        .with_notify_timeout(config.notify_timeout)
        .run()
        .await
}

fn classify(
    args: &ConfigArgs,
    kind: ChangeKind,
    reason: String,
    count: u32,
    component: String,
) -> anyhow::Result<()> {
    let classifier = Classifier::new(args.classifier_config()?);
    let event = Event::new(reason).with_count(count).with_source(component);
    let classification = classifier.explain(&event, kind);

    println!(
        "Event: {} {} (count {}, component {:?})",
        kind, event.reason, event.count, event.source_component
    );
    println!("Verdict: {}", classification.verdict);
    println!("Rule: {}", classification.rule);

    Ok(())
}
