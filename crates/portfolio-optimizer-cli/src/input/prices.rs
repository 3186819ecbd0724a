use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use std::io::Read;

use portfolio_optimizer_core::estimation::PriceSeries;

use super::file::resolve_path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Load a wide closing-price file: a `date` column followed by one column
/// per ticker. Empty cells are missing observations.
pub fn read_prices_csv(path: &str) -> Result<PriceSeries, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let file = std::fs::File::open(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    parse_prices(file).map_err(|e| format!("{}: {}", canonical.display(), e).into())
}

fn parse_prices<R: Read>(source: R) -> Result<PriceSeries, Box<dyn std::error::Error>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(source);

    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err("price file needs a date column and at least one ticker column".into());
    }
    let tickers: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut rows: Vec<(NaiveDate, Vec<Option<f64>>)> = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let raw_date = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
            .map_err(|e| format!("row {}: bad date '{}': {}", line + 2, raw_date, e))?;
        let closes = (1..=tickers.len())
            .map(|col| match record.get(col) {
                None | Some("") => Ok(None),
                Some(cell) => cell
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|e| format!("row {}: bad price '{}': {}", line + 2, cell, e)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push((date, closes));
    }

    rows.sort_by_key(|(date, _)| *date);
    let (dates, closes) = rows.into_iter().unzip();
    tracing::debug!(tickers = tickers.len(), "loaded price file");
    Ok(PriceSeries::new(tickers, dates, closes)?)
}
