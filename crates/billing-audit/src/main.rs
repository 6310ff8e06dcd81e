mod bootstrap;
mod report;

use anyhow::{Context, Result};
use audit_core::settings::Settings;
use audit_runtime::runner::AuditRunner;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_config().context("loading settings")?;

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    tracing::info!("Billing audit v{} starting", env!("CARGO_PKG_VERSION"));

    if settings.clear {
        tracing::info!("Saved configuration cleared");
        println!("Saved configuration cleared.");
        return Ok(());
    }

    tracing::info!(
        "Output: {}, format: {}, joined: {}",
        settings.output_dir.display(),
        settings.format,
        settings.materialize_joined
    );

    let runner = AuditRunner::from_settings(&settings).context("resolving staged inputs")?;
    let outcome = runner
        .run(settings.run_id.clone())
        .await
        .context("audit run failed")?;

    print!("{}", report::render(&outcome));
    Ok(())
}
