//! Import reference theories from JSON files
//!
//! Each file holds one theory object or an array of them. Directories are
//! walked recursively for `*.json` files. Existing ids are updated in place.
//!
//! Usage: cargo run --bin import -- /path/to/theories [more files or dirs...]

use anyhow::{Context, Result};
use rusqlite::Connection;
use scene_advisor::{db, AdvisorConfig, CandidateTheory};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TheoryFile {
    Many(Vec<CandidateTheory>),
    One(Box<CandidateTheory>),
}

impl TheoryFile {
    fn into_vec(self) -> Vec<CandidateTheory> {
        match self {
            TheoryFile::Many(theories) => theories,
            TheoryFile::One(theory) => vec![*theory],
        }
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <theory-files-or-dirs...>", args[0]);
        eprintln!("Example: {} ./theories/negotiation.json ./theories/extra", args[0]);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let db_path = AdvisorConfig::from_env().db_path;
    println!("Opening database at {:?}", db_path);
    let conn = db::init_db(&db_path)?;

    let mut total_files = 0;
    let mut total_theories = 0;

    for arg in &args[1..] {
        let path = PathBuf::from(arg);
        if !path.exists() {
            eprintln!("Warning: {} does not exist, skipping", arg);
            continue;
        }

        println!("\nProcessing: {:?}", path);

        let (files, theories) = import_path(&conn, &path)?;
        total_files += files;
        total_theories += theories;
    }

    println!("\n========================================");
    println!("Import complete!");
    println!("  Files: {}", total_files);
    println!("  Theories: {}", total_theories);
    println!("  Pool size: {}", db::count_theories(&conn)?);
    println!("========================================");

    Ok(())
}

/// Import one file, or every `*.json` under a directory; returns (files, theories)
fn import_path(conn: &Connection, path: &Path) -> Result<(usize, usize)> {
    let mut files = 0;
    let mut theories = 0;

    let mut entries: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("json"))
        .map(|e| e.into_path())
        .collect();
    // pool order follows file order
    entries.sort();

    for entry in entries {
        let fname = entry.file_name().and_then(|n| n.to_str()).unwrap_or("?").to_string();
        match import_file(conn, &entry) {
            Ok(n) => {
                files += 1;
                theories += n;
                println!("  ✓ {} ({} theories)", fname, n);
            }
            Err(e) => {
                eprintln!("  ✗ {}: {:#}", fname, e);
            }
        }
    }

    Ok((files, theories))
}

fn import_file(conn: &Connection, path: &Path) -> Result<usize> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let parsed: TheoryFile =
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?;

    let theories = parsed.into_vec();
    for theory in &theories {
        if theory.id.trim().is_empty() || theory.name.trim().is_empty() {
            anyhow::bail!("theory without id or name");
        }
    }
    for theory in &theories {
        db::upsert_theory(conn, theory).with_context(|| format!("Failed to store theory {}", theory.id))?;
    }

    Ok(theories.len())
}
