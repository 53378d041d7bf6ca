use clap::Parser;
use olsync::config::Cli;
use olsync::logging::init_tracing;
use olsync::{Config, SyncError};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::try_from(cli)?;
    tracing::debug!(version = olsync::VERSION, project = %config.project, "starting");

    let report = match olsync::commands::run(&config) {
        Ok(report) => report,
        Err(err @ SyncError::CorruptStore { .. }) => {
            return Err(anyhow::Error::new(err).context(
                "Refusing to sync without a readable fingerprint store. \
                 Inspect or delete the file manually, then re-run; \
                 deleting it makes every file look new on both sides",
            ));
        }
        Err(err) => return Err(err.into()),
    };

    if let Some(report) = report {
        if let Some(reason) = &report.aborted {
            anyhow::bail!("sync aborted: {}", reason);
        }
        if !report.failures.is_empty() {
            anyhow::bail!("{} action(s) failed", report.failures.len());
        }
    }

    Ok(())
}
