use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

use crate::error::BotError;
use crate::models::{OhlcvBar, Tick};
use crate::Result;

/// Exchange candlestick export: `t,o,h,l,c,v`
#[derive(Debug, Deserialize)]
struct CsvRow {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    #[serde(default)]
    v: f64,
}

/// Seconds or milliseconds since the epoch, whichever the value looks like
fn parse_time(t: i64) -> Option<DateTime<Utc>> {
    if t > 100_000_000_000 {
        Utc.timestamp_millis_opt(t).single()
    } else {
        Utc.timestamp_opt(t, 0).single()
    }
}

/// Read bars from a CSV file, oldest first
pub fn load_bars_csv(path: &Path) -> Result<Vec<OhlcvBar>> {
    let file = std::fs::File::open(path)
        .map_err(|e| BotError::Config(format!("cannot open {}: {}", path.display(), e)))?;
    read_bars(file)
}

/// Parse bars from any CSV source.
///
/// Rows that fail to parse or validate are skipped with a warning; the
/// result is sorted by time with duplicate timestamps removed.
pub fn read_bars<R: Read>(reader: R) -> Result<Vec<OhlcvBar>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut bars = Vec::new();
    let mut skipped = 0usize;

    for (line, result) in csv_reader.deserialize::<CsvRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("row {}: {}", line + 1, e);
                skipped += 1;
                continue;
            }
        };

        let Some(timestamp) = parse_time(row.t) else {
            skipped += 1;
            continue;
        };

        let bar = OhlcvBar {
            timestamp,
            open: row.o,
            high: row.h,
            low: row.l,
            close: row.c,
            volume: row.v,
        };
        match bar.validate() {
            Ok(()) => bars.push(bar),
            Err(e) => {
                tracing::warn!("row {}: {}", line + 1, e);
                skipped += 1;
            }
        }
    }

    bars.sort_by_key(|bar| bar.timestamp);
    bars.dedup_by_key(|bar| bar.timestamp);

    if skipped > 0 {
        tracing::warn!("Skipped {} malformed rows", skipped);
    }
    Ok(bars)
}

/// Replay bar closes as ticks, one per bar
pub fn closes_as_ticks(symbol: &str, bars: &[OhlcvBar]) -> Vec<Tick> {
    bars.iter()
        .map(|bar| Tick {
            symbol: symbol.to_string(),
            price: bar.close,
            timestamp: bar.timestamp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bars() {
        let data = "t,o,h,l,c,v\n\
                    1700003600,101,103,100,102,5\n\
                    1700000000,100,102,99,101,4\n\
                    1700007200,bad,1,1,1,1\n\
                    1700010800,102,101,103,102,1\n";
        let bars = read_bars(data.as_bytes()).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(bars[1].close, 102.0);
    }

    #[test]
    fn test_millisecond_timestamps() {
        let data = "t,o,h,l,c,v\n1700000000000,1,2,1,2,0\n";
        let bars = read_bars(data.as_bytes()).unwrap();
        assert_eq!(bars[0].timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_closes_as_ticks() {
        let data = "t,o,h,l,c,v\n1700000000,1,2,1,2,0\n1700000060,2,3,2,3,0\n";
        let bars = read_bars(data.as_bytes()).unwrap();
        let ticks = closes_as_ticks("BTC_USDT", &bars);

        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[1].price, 3.0);
        assert_eq!(ticks[1].symbol, "BTC_USDT");
    }

    #[test]
    fn test_missing_file() {
        let result = load_bars_csv(Path::new("/nonexistent/bars.csv"));
        assert!(matches!(result, Err(BotError::Config(_))));
    }
}
