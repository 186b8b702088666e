use clap::Parser;
use mirrorwatch::commands::{browse, run};
use mirrorwatch::config::{Cli, Command};
use mirrorwatch::{logging, SyncConfig, SyncError};
use tracing::info;

fn report(err: SyncError) -> anyhow::Error {
    if let Some(hint) = run::suggestion(&err) {
        eprintln!("{}", console::style(format!("Try: {}", hint)).dim());
    }
    err.into()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            // Convert CLI args to SyncConfig - this validates immediately
            let mut config = SyncConfig::try_from(args).map_err(report)?;
            config.quiet = cli.quiet;

            let created = run::prepare_local_root(&config).map_err(report)?;
            let reporter = run::reporter_for(&config);
            let (_guard, log_path) = logging::init_logging(
                &config.local_root,
                cli.verbose,
                cli.quiet,
                reporter.console_writer(),
            )
            .map_err(report)?;
            if created {
                info!("Created local folder {}", config.local_root.display());
            }
            info!("Logging to {}", log_path.display());

            run::run(config, &reporter).await.map_err(report)?;
        }
        Command::Browse(args) => {
            logging::init_console_logging(cli.verbose, cli.quiet).map_err(report)?;
            browse::run(args).await.map_err(report)?;
        }
    }

    Ok(())
}
