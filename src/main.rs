use std::io::Read;

use ai_learn::batch::BatchProgress;
use ai_learn::{LearningOrchestrator, OrchestratorConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let text = match std::env::args().nth(1) {
        Some(path) if path != "-" => std::fs::read_to_string(&path).map_err(|e| {
            eprintln!("Error: could not read {path}: {e}");
            e
        })?,
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    if text.trim().is_empty() {
        eprintln!("Usage: ai-learn [FILE]   (reads stdin when FILE is omitted or '-')");
        std::process::exit(2);
    }

    let config = OrchestratorConfig::from_env()?;

    eprintln!("📚 AI Learn v{}", env!("CARGO_PKG_VERSION"));
    match &config.providers.local {
        Some(local) => eprintln!("   Local: {} ({})", local.base_url, local.model),
        None => eprintln!("   Local: disabled"),
    }
    match &config.providers.remote {
        Some(remote) => eprintln!("   Remote: {} ({})", remote.base_url, remote.model),
        None => eprintln!("   Remote: disabled"),
    }
    if let Some(target) = &config.learner.target_language {
        eprintln!("   Target language: {target}");
    }
    eprintln!("   Difficulty: {}\n", config.learner.difficulty);

    let orchestrator = LearningOrchestrator::from_config(config)?;
    let status = orchestrator.coordinator().refresh_status(true).await;
    if !status.any_available() {
        tracing::warn!("No provider answered the health check; continuing anyway");
    }

    let progress = |p: &BatchProgress| {
        tracing::info!(
            completed = p.completed,
            total = p.total,
            batch = p.current_batch,
            batches = p.total_batches,
            "Vocabulary progress"
        );
    };
    let analysis = orchestrator.analyze_text(&text, Some(&progress)).await?;
    orchestrator.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}
