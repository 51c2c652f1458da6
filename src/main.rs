mod api;
mod gateway;
#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use mamaz_core::{
    config::{shellexpand, Config},
    traits::Automation,
};
use mamaz_whatsapp::WhatsAppAutomation;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "mamaz",
    version,
    about = "WhatsApp session relay with an HTTP control surface"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay (default).
    Start,
    /// Check configuration and session token state without starting.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Values already in the environment take precedence over `.env`.
    dotenvy::dotenv().ok();
    let cfg = Config::from_env()?;
    let _guard = init_tracing(cfg.log_dir.as_deref());

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => {
            let problems = cfg.validate();
            if cfg.automation_enabled && !problems.is_empty() {
                for problem in &problems {
                    error!("config: {problem}");
                }
                anyhow::bail!("invalid configuration ({} problem(s))", problems.len());
            }
            for problem in &problems {
                warn!("config: {problem} (ignored, automation disabled)");
            }

            let automation: Option<Arc<dyn Automation>> = if cfg.automation_enabled {
                Some(Arc::new(WhatsAppAutomation::new(cfg.session_name.clone())))
            } else {
                warn!("automation disabled: serving the HTTP surface only");
                None
            };

            gateway::Gateway::new(cfg, automation).run().await?;
        }
        Commands::Status => print_status(&cfg),
    }

    Ok(())
}

/// Stdout always; a daily-rolling file too when `LOG_DIR` is set.
fn init_tracing(log_dir: Option<&str>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(shellexpand(dir), "mamaz.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    guard
}

fn print_status(cfg: &Config) {
    println!("mamaz status check\n");

    let problems = cfg.validate();
    if problems.is_empty() {
        println!("  config:     valid");
    } else {
        println!("  config:     {} problem(s)", problems.len());
        for problem in &problems {
            println!("    - {problem}");
        }
    }

    println!(
        "  automation: {}",
        if cfg.automation_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "  webhook:    {}",
        if cfg.webhook.is_configured() {
            "configured"
        } else {
            "not configured (calls skipped)"
        }
    );

    let token_dir = cfg.session_token_dir();
    println!(
        "  token dir:  {} ({})",
        token_dir.display(),
        if token_dir.exists() {
            "present"
        } else {
            "absent"
        }
    );
}
