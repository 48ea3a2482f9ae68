use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use policy_window::config::AppConfig;
use policy_window::reconcile::ReconcileRunner;
use policy_window::router::{
    FileRuleSource, IkuaiClient, IkuaiGateway, RouterApi, RouterRuleSource, RuleSource,
};
use policy_window::utils::clock::{parse_instant, SystemClock};
use policy_window::utils::{logging, metrics, metrics_channel};
use policy_window::{error, info};

/// Resolve device rules into block windows and keep the router in sync
#[derive(Parser, Debug)]
#[command(name = "policy-window", version, about)]
struct Args {
    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Evaluate the single cycle at this RFC 3339 instant
    #[arg(long, requires = "once", value_name = "RFC3339")]
    at: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::init_logging(config.log_level, config.log_file.as_deref(), true, true).await {
        println!("Failed to initialize logger: {}", e);
    }

    // Register metrics before opening the channel that feeds them
    let registry = metrics::init(config.metrics_enabled);
    metrics::register_reconcile_metrics(&registry).await;
    metrics_channel::init_metrics_channel();

    if config.metrics_enabled && !args.once {
        if let Err(e) = metrics::start_server(config.metrics_addr).await {
            error!("Failed to start metrics server on {}: {}", config.metrics_addr, e);
        }
    }

    let client = match IkuaiClient::new(&config.router_url, config.router_session.clone(), config.router_timeout) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to build router client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let api: Arc<dyn RouterApi> = client;

    let source: Arc<dyn RuleSource> = match &config.rules_file {
        Some(path) => {
            info!("Reading rules from {}", path.display());
            Arc::new(FileRuleSource::new(path.clone()))
        }
        None => Arc::new(RouterRuleSource::new(api.clone())),
    };

    let runner = ReconcileRunner::new(
        source,
        Arc::new(IkuaiGateway::new(api)),
        Arc::new(SystemClock::new(config.schedule_offset)),
        config.macs.clone(),
    );

    info!(
        "Reconciling {} devices against {} every {}s (offset {})",
        runner.macs().len(),
        config.router_url,
        config.reconcile_interval.as_secs(),
        config.schedule_offset
    );

    if args.once {
        let report = match &args.at {
            Some(at) => match parse_instant(at) {
                Ok(now) => runner.run_cycle_at(now.with_timezone(&config.schedule_offset)).await,
                Err(e) => {
                    error!("Refusing --at {}: {}", at, e);
                    return ExitCode::from(2);
                }
            },
            None => runner.run_cycle().await,
        };

        for (mac, outcome) in &report.outcomes {
            println!("{} {:?}", mac, outcome);
        }
        for failure in &report.failures {
            eprintln!("{} failed: {}", failure.mac, failure.error);
        }

        return if report.failures.is_empty() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let mut ticker = tokio::time::interval(config.reconcile_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                runner.run_cycle().await;
            }
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("policy-window").chain(list.iter().copied()))
    }

    #[test]
    fn parses_flags() {
        assert!(!args(&[]).unwrap().once);
        let parsed = args(&["--once", "--at", "2024-02-07T22:35:00+08:00"]).unwrap();
        assert!(parsed.once);
        assert_eq!(parsed.at.as_deref(), Some("2024-02-07T22:35:00+08:00"));
    }

    #[test]
    fn rejects_bad_flags() {
        assert!(args(&["--at", "2024-02-07T22:35:00+08:00"]).is_err());
        assert!(args(&["--once", "--at"]).is_err());
        assert!(args(&["--forever"]).is_err());
    }
}
