//! scene-advisor CLI
//!
//! Run the HTTP service, answer one request from the command line, or
//! manage the theory pool.
//!
//! Run with: cargo run --bin advisor -- --serve --port=3100

use anyhow::{bail, Context, Result};
use scene_advisor::{
    db, seed, server, AdvisorConfig, AdvisorService, HttpGenerationClient, SqliteGateway,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 3100;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = AdvisorConfig::from_env();

    match args.get(1).map(|s| s.as_str()) {
        Some("--serve") => {
            let port: u16 = args
                .iter()
                .find_map(|a| a.strip_prefix("--port="))
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT);
            run_http_server(config, port).await
        }
        Some("advise") => {
            let body = json_arg(&args)?;
            let service = build_service(config)?;
            print_json(&service.advise(&body).await?)
        }
        Some("checklist") => {
            let body = json_arg(&args)?;
            let service = build_service(config)?;
            print_json(&service.checklist(&body).await?)
        }
        Some("theories") => {
            let body = json_arg(&args)?;
            let service = build_service(config)?;
            print_json(&service.related_theories(&body).await?)
        }
        Some("--seed") => run_seed(&config),
        Some("--stats") => run_stats(&config),
        _ => {
            print_usage(&args);
            Ok(())
        }
    }
}

fn print_usage(args: &[String]) {
    let bin = args.first().map(|s| s.as_str()).unwrap_or("advisor");
    eprintln!("Usage:");
    eprintln!("  {} --serve [--port=N]       Run the HTTP service (default port {})", bin, DEFAULT_PORT);
    eprintln!("  {} advise '<json>'          Advice for one context", bin);
    eprintln!("  {} checklist '<json>'       Preparation checklist for one context", bin);
    eprintln!("  {} theories '<json>'        Related theories for a piece of advice", bin);
    eprintln!("  {} --seed                   Load the built-in theories into an empty pool", bin);
    eprintln!("  {} --stats                  Show pool and session counts", bin);
}

fn json_arg(args: &[String]) -> Result<serde_json::Value> {
    let raw = args[2..].join(" ");
    if raw.trim().is_empty() {
        bail!("Expected a JSON request body argument");
    }
    serde_json::from_str(&raw).context("Request body is not valid JSON")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_service(config: AdvisorConfig) -> Result<AdvisorService> {
    if config.generation.api_key.is_empty() {
        tracing::warn!("No API key configured; every request will be answered with the fallback");
    }

    let generator = HttpGenerationClient::new(&config.generation).context("Failed to build generation client")?;
    let store = Arc::new(
        SqliteGateway::open(&config.db_path)
            .with_context(|| format!("Failed to open database at {:?}", config.db_path))?,
    );
    tracing::info!("Database initialized at {:?}", config.db_path);

    Ok(AdvisorService::new(config, Arc::new(generator), store.clone(), store))
}

/// HTTP service mode
async fn run_http_server(config: AdvisorConfig, port: u16) -> Result<()> {
    eprintln!("scene-advisor starting on port {}...", port);

    let service = Arc::new(build_service(config)?);
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;

    server::serve(listener, service).await
}

fn run_seed(config: &AdvisorConfig) -> Result<()> {
    let conn = db::init_db(&config.db_path)?;
    let added = seed::seed_if_empty(&conn)?;
    if added == 0 {
        println!("Theory pool already populated; nothing seeded");
    } else {
        println!("Seeded {} theories into {:?}", added, config.db_path);
    }
    Ok(())
}

fn run_stats(config: &AdvisorConfig) -> Result<()> {
    let conn = db::init_db(&config.db_path)?;

    println!("\nSCENE-ADVISOR STATISTICS");
    println!("Database: {:?}\n", config.db_path);

    println!("Theories: {}", db::count_theories(&conn)?);
    println!("Sessions: {}", db::count_sessions(&conn)?);

    let by_scene = db::sessions_by_scene(&conn)?;
    if !by_scene.is_empty() {
        println!("\nSESSIONS BY SCENE:");
        for (scene, count) in by_scene {
            println!("   {:<16} {}", scene, count);
        }
    }

    Ok(())
}
