//! Headless client for progressive meshes.
//!
//! Resolves a mesh descriptor, streams the payload level by level with range
//! requests and reports each level as it becomes drawable. The assembled
//! buffer can be written to disk for inspection.

mod launch_params;
mod loader;
mod ui;

use popbuffer::LoadPhase;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let params = launch_params::parse();
    tracing::debug!(?params, "launch parameters");

    let report = loader::load(&params).await?;
    let session = &report.session;

    match &report.outcome {
        Ok(LoadPhase::Complete { degraded }) => tracing::info!(
            vertices = session.draw_vertex_count(),
            degraded,
            elapsed = ?report.elapsed,
            received_bytes = report.received_bytes,
            "load finished"
        ),
        Ok(phase) => tracing::info!(?phase, "load ended"),
        Err(e) => tracing::warn!(
            error = %e,
            vertices = session.draw_vertex_count(),
            status = ?report.status,
            "load ended early"
        ),
    }

    match loader::summarize(session)? {
        Some(summary) => tracing::info!(
            vertices = summary.vertex_count,
            min = ?summary.min,
            max = ?summary.max,
            mean_normal_length = summary.mean_normal_length,
            "decoded drawable vertices"
        ),
        None => tracing::info!("nothing drawable"),
    }

    if let Some(path) = &params.dump {
        std::fs::write(path, session.buffer().as_bytes())?;
        tracing::info!(
            path = %path.display(),
            bytes = session.buffer().len(),
            valid_bytes = session.drawable_bytes().len(),
            "vertex buffer written"
        );
    }

    // Descriptor problems abort; a stalled or cancelled load still produced a
    // usable buffer but is reported as a failure.
    report.outcome?;
    Ok(())
}
