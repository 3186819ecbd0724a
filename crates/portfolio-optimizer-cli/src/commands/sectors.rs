use clap::Args;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use portfolio_optimizer_core::data::{nifty50, StaticSectorTable};

use crate::input;

#[derive(Args)]
pub struct SectorsArgs {
    /// Ticker -> sector map (JSON or YAML) to show instead of the built-in table
    #[arg(long, conflicts_with = "nifty50")]
    pub sectors: Option<String>,

    /// Show the built-in Nifty 50 classification (the default)
    #[arg(long)]
    pub nifty50: bool,
}

#[derive(Debug, Serialize)]
struct SectorRow<'a> {
    ticker: &'a str,
    name: &'a str,
    sector: &'a str,
}

/// The sector table used by `optimize`: a user map when given, otherwise
/// the Nifty 50 classification.
pub fn load_sector_table(path: Option<&str>) -> Result<StaticSectorTable, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let map: BTreeMap<String, String> = input::file::read_document(path)?;
            tracing::debug!(entries = map.len(), path, "loaded sector map");
            Ok(StaticSectorTable::new(map))
        }
        None => Ok(nifty50::sector_table()),
    }
}

pub fn run_sectors(args: SectorsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let table = load_sector_table(args.sectors.as_deref())?;
    let rows: Vec<SectorRow> = table
        .entries()
        .map(|(ticker, sector)| SectorRow {
            ticker,
            name: nifty50::company_name(ticker).unwrap_or(""),
            sector,
        })
        .collect();
    Ok(serde_json::to_value(rows)?)
}
