use anyhow::Context;

use tokoledger_print_agent::app::{AgentState, build_app};
use tokoledger_print_agent::config::AgentConfig;
use tokoledger_print_agent::printer::{MEMORY_JOB_LIMIT, Printer, PrinterTarget};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tokoledger_observability::init();

    let config = AgentConfig::from_env()?;
    let printer = Printer::new(config.target.clone());
    tracing::info!(printer = %config.target, paper_mm = config.paper_mm, "print agent configured");
    if config.target == PrinterTarget::Memory {
        tracing::warn!(
            keep = MEMORY_JOB_LIMIT,
            "PRINTER_TARGET is memory: jobs are not printed, only the most recent are kept"
        );
    }

    let app = build_app(AgentState::new(&config, printer));
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
