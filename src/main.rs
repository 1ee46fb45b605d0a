use anyhow::Context;

use intake_agent::config::IntakeConfig;
use intake_agent::server::build_app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = IntakeConfig::from_env().context("Invalid configuration")?;

    eprintln!("Intake Agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/process_input", config.port);

    match &config.db_path {
        Some(path) => eprintln!("   Context store: {}", path.display()),
        None => eprintln!("   Context store: in-memory"),
    }
    eprintln!(
        "   Regulatory keywords: {}",
        config.regulatory_keywords.join(", ")
    );
    eprintln!("   High-value threshold: {}\n", config.high_value_threshold);

    let app = build_app(&config)
        .await
        .context("Failed to start intake pipeline")?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Intake server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
