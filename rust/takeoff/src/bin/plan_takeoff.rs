// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI tool: quantity take-off from floor plan page images
//!
//! Usage:
//!   plan-takeoff <page images...> --scale 1:100 [options]

use anyhow::{Context, Result};
use clap::Parser;
use plan_takeoff::{
    concrete_volume, line_items, net_wall_area, AnalysisReport, Analyzer, ElementCategory,
    PageRaster, TakeoffConfig, Unit,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plan-takeoff")]
#[command(about = "Detect building elements on floor plan rasters and total their quantities", long_about = None)]
struct Cli {
    /// Page images, one per page, in page order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Drawing scale, e.g. 1:100
    #[arg(short, long)]
    scale: String,

    /// Resolution of the images (overrides the configured fallback)
    #[arg(long)]
    dpi: Option<f64>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Page indices to process
    #[arg(long, value_delimiter = ',')]
    pages: Option<Vec<usize>>,

    /// Treat every page as a foundation plan
    #[arg(long)]
    foundation: bool,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,

    /// Hide elements below this confidence in the summary
    #[arg(long, default_value_t = 0.0)]
    min_confidence: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("plan_takeoff=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            TakeoffConfig::from_json_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => TakeoffConfig::default(),
    }
    .with_env_overrides()
    .context("applying TAKEOFF_* overrides")?;

    if let Some(dpi) = cli.dpi {
        config.dpi = Some(dpi);
    }
    if cli.pages.is_some() {
        config.pages = cli.pages.clone();
    }

    let mut pages = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        let image = image::open(path)
            .with_context(|| format!("loading {}", path.display()))?
            .to_luma8();
        let mut raster = PageRaster::new(image);
        if let Some(dpi) = cli.dpi {
            raster = raster.with_dpi(dpi);
        }
        if cli.foundation {
            raster = raster.foundation_plan();
        }
        pages.push(raster);
    }

    let analyzer = Analyzer::new(config)?.with_scale(&cli.scale)?;
    let report = analyzer.analyze(&pages)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report, analyzer.config(), cli.min_confidence);
    }

    Ok(())
}

fn print_summary(report: &AnalysisReport, config: &TakeoffConfig, min_confidence: f64) {
    let elements = report.elements.filter_by_confidence(min_confidence);

    println!("Pages analyzed: {}", report.pages.len());
    for page in &report.pages {
        let d = &page.diagnostics;
        if d.timed_out {
            println!("  page {}: timed out, no results", page.page);
            continue;
        }
        if d.empty_raster {
            println!("  page {}: empty raster, no results", page.page);
            continue;
        }
        println!(
            "  page {}: {} elements, {} unclassified, {} unresolved segments ({:.2} m)",
            page.page,
            page.elements.len(),
            page.unclassified.len(),
            d.unresolved_segments,
            d.unresolved_length_m
        );
    }

    println!();
    println!("{:<5} {:<16} {:<24} {:>10} {:<4}", "Pos", "Element", "Description", "Qty", "Unit");
    for item in line_items(&elements, config) {
        println!(
            "{:<5} {:<16} {:<24} {:>10.2} {:<4}",
            item.position,
            item.element.to_string(),
            item.description,
            item.quantity,
            item.unit.symbol()
        );
    }

    println!();
    println!("Totals:");
    for (group, units) in &report.ledger.groups {
        let parts: Vec<String> = units
            .iter()
            .map(|(unit, value)| format!("{value:.2} {}", unit.symbol()))
            .collect();
        println!("  {:<8} {}", group, parts.join(", "));
    }

    let counts = &report.ledger.summary.per_category;
    println!();
    println!(
        "Elements: {} ({} exterior walls, {} interior walls)",
        report.ledger.summary.total_elements,
        counts.get(&ElementCategory::ExteriorWall).copied().unwrap_or(0),
        counts.get(&ElementCategory::InteriorWall).copied().unwrap_or(0),
    );
    println!(
        "Wall length: {:.2} m, net wall face area: {:.2} m²",
        report.ledger.group_total("Wall", Unit::LengthM),
        net_wall_area(&report.elements, config)
    );
    println!("Concrete volume: {:.2} m³", concrete_volume(&report.elements));
}
