use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::data::{InstrumentResult, MarketSnapshot, RatesOutcome, SnapshotEngine, SnapshotProvider};
use crate::llm::LLMClient;
use crate::orchestrator::{CycleEvent, DailyCycleOrchestrator, StageKind};

/// Run one daily cycle and print the final memo
pub async fn run_cycle(
    config: Config,
    identifiers: Option<Vec<String>>,
    show_stages: bool,
) -> Result<()> {
    let mut orchestrator = DailyCycleOrchestrator::from_config(&config)?;

    let printer = if show_stages {
        let (tx, mut rx) = mpsc::unbounded_channel();
        orchestrator = orchestrator.with_events(tx);
        Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                print_event(&event);
            }
        }))
    } else {
        None
    };

    let result = orchestrator.run_daily_cycle(identifiers).await;

    // Dropping the orchestrator closes the event channel so the printer drains and exits
    drop(orchestrator);
    if let Some(printer) = printer {
        printer.await?;
    }

    match result {
        Ok(report) => {
            println!("\n=== CIO FINAL REPORT ===\n");
            println!("{}", report.memo);
            println!("\n{}", "=".repeat(24));
            info!(
                stages = report.stages.len(),
                elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
                "Daily cycle report delivered"
            );
            Ok(())
        }
        Err(e) => {
            error!(stage = %e.stage(), "Daily cycle failed");
            Err(e.into())
        }
    }
}

fn print_event(event: &CycleEvent) {
    match event {
        CycleEvent::StageStarted { stage } => {
            println!("\n>>> Stage {}/{}: {}", stage.index(), StageKind::ALL.len(), stage);
        }
        CycleEvent::StageCompleted { stage, output } => {
            if *stage != StageKind::CioSynthesizer {
                println!("{}", output);
            }
        }
        CycleEvent::CycleFailed { stage, reason } => {
            println!("!!! Stage {} ({}) failed: {}", stage.index(), stage, reason);
        }
    }
}

/// Compute the snapshot and print it
pub async fn snapshot(config: Config, identifiers: Option<Vec<String>>, json: bool) -> Result<()> {
    let engine = SnapshotEngine::from_config(&config)?;
    let snapshot = engine.get_market_snapshot(identifiers).await;

    if json {
        println!("{}", snapshot.render()?);
    } else {
        print_snapshot(&snapshot);
    }

    Ok(())
}

fn print_snapshot(snapshot: &MarketSnapshot) {
    if let Some(error) = snapshot.market_data_error() {
        println!("Error fetching market data: {}", error);
    }

    match snapshot.rates() {
        RatesOutcome::Observed(rates) => {
            println!("\n  [Rates Data]:");
            for (name, value) in rates {
                println!("    {}: {}%", name, value);
            }
        }
        RatesOutcome::NotConfigured => {
            println!("\n  [Rates Data]: not configured (set FRED_API_KEY)");
        }
        RatesOutcome::Unavailable(reason) => {
            println!("Error fetching rates: {}", reason);
        }
    }

    println!("\n  [Market Data]:");
    for (symbol, result) in snapshot.instruments() {
        println!("  {}:", symbol);
        match result {
            InstrumentResult::Metrics(m) => {
                println!("    price: {}", m.price);
                println!("    daily_change_pct: {}", m.daily_change_pct);
                println!("    z_score_30d: {}", m.z_score_30d);
                println!("    volatility_annualized: {}", m.volatility_annualized);
            }
            InstrumentResult::Failed { error } => {
                println!("    error: {}", error);
            }
        }
    }
}

/// Print configuration and probe the LLM backend
pub async fn check(config: Config) -> Result<()> {
    println!("Ollama URL: {}", config.llm.ollama_url);
    println!(
        "FRED rates: {}",
        if config.apis.fred_api_key.is_some() {
            "configured"
        } else {
            "not configured"
        }
    );
    println!("Default basket: {}", config.market.default_symbols.join(", "));
    println!("Lookback: {}", config.market.lookback.as_range());
    println!("\nStage models:");
    for (stage, params) in config.stages.iter() {
        match params.temperature {
            Some(t) => println!("  {}. {}: {} (temperature {})", stage.index(), stage, params.model, t),
            None => println!("  {}. {}: {}", stage.index(), stage, params.model),
        }
    }

    let mut models: Vec<String> = config.stages.iter().map(|(_, p)| p.model.clone()).collect();
    models.sort();
    models.dedup();

    let client = LLMClient::from_config(&config)?;
    let missing = client.health_check(&models).await?;
    if missing.is_empty() {
        println!("\nLLM backend reachable, all stage models available");
    } else {
        warn!(missing = ?missing, "Some stage models are not pulled");
        println!("\nLLM backend reachable, missing models: {}", missing.join(", "));
    }

    Ok(())
}
