//! Show how every catalog track scores against a recognition hit
//!
//! Usage: explain-score <catalog.json> <title> [artist] [--top N] [--json]

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use std::path::PathBuf;

use spyn_match::catalog::JsonCatalog;
use spyn_match::scoring::{score_breakdown, ScoreBreakdown, ACCEPTANCE_THRESHOLD};

#[derive(Parser)]
#[command(name = "explain-score")]
#[command(about = "Print the per-signal score breakdown of each catalog track")]
struct Args {
    catalog: PathBuf,

    title: String,

    #[arg(default_value = "")]
    artist: String,

    /// Rows to print
    #[arg(long, default_value = "20")]
    top: usize,

    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let catalog = JsonCatalog::from_file(&args.catalog)
        .with_context(|| format!("Failed to load catalog {:?}", args.catalog))?;
    let tracks = catalog.tracks();

    let mut rows: Vec<(usize, &str, &str, ScoreBreakdown)> = tracks
        .par_iter()
        .enumerate()
        .map(|(idx, t)| {
            (
                idx,
                t.id.as_str(),
                t.producer_name.as_str(),
                score_breakdown(&args.title, &args.artist, t),
            )
        })
        .collect();

    // Highest first; equal totals keep catalog order, like the selector
    rows.sort_by(|a, b| b.3.total().total_cmp(&a.3.total()).then(a.0.cmp(&b.0)));
    rows.truncate(args.top);

    if args.json {
        let out: Vec<_> = rows
            .iter()
            .map(|(_, id, producer, b)| {
                serde_json::json!({
                    "id": id,
                    "producer_name": producer,
                    "total": b.total(),
                    "breakdown": b,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Hit: '{}' by '{}' ({} tracks)", args.title, args.artist, tracks.len());
    println!("{:-<100}", "");
    println!(
        "{:>6} {:>6} {:>6} {:>6} {:>6} {:>6}  {:<12} {}",
        "total", "title", "artist", "contn", "words", "remix", "id", "candidate"
    );
    for (_, id, producer, b) in &rows {
        let marker = if b.exact {
            "="
        } else if b.total() >= ACCEPTANCE_THRESHOLD {
            "+"
        } else {
            " "
        };
        println!(
            "{:>6.3} {:>6.3} {:>6.2} {:>6.2} {:>6.3} {:>6.2}{} {:<12} {} - {}",
            b.total(),
            b.title_score,
            b.artist_bonus,
            b.contains_bonus,
            b.word_bonus,
            b.remix_bonus,
            marker,
            id,
            producer,
            b.candidate_title
        );
    }

    if rows.is_empty() {
        println!("No tracks in catalog.");
    }

    Ok(())
}
