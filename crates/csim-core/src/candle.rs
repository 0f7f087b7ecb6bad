use std::ops::Index;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// One OHLCV bar. Immutable once the series is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Unix seconds, strictly increasing across a series.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// An ordered, validated candle sequence.
///
/// Construction enforces the series invariants: timestamps strictly
/// increasing (unique), prices positive, volume non-negative. Candles are
/// addressed by index for the lifetime of a simulation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Build a series from candles already in chronological order.
    pub fn from_candles(candles: Vec<Candle>) -> Result<Self> {
        for (i, c) in candles.iter().enumerate() {
            if c.open <= 0.0 || c.high <= 0.0 || c.low <= 0.0 || c.close <= 0.0 {
                return Err(SimError::InvalidParameter(format!(
                    "non-positive price at candle {i}"
                )));
            }
            if c.volume < 0.0 {
                return Err(SimError::InvalidParameter(format!(
                    "negative volume at candle {i}"
                )));
            }
            if i > 0 && c.time <= candles[i - 1].time {
                return Err(SimError::InvalidParameter(format!(
                    "timestamps not strictly increasing at candle {i}"
                )));
            }
        }
        Ok(Self { candles })
    }

    /// Load candles from a CSV file using memory-mapped I/O.
    ///
    /// Expected columns: timestamp,open,high,low,close,volume. Timestamps
    /// may be unix seconds or ISO8601 (`2025-01-01T00:00:00Z` /
    /// `...+00:00`). Rows are sorted by timestamp before validation.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| SimError::Io(e.to_string()))?;
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|e| SimError::Io(e.to_string()))?;
        Self::parse_csv_bytes(&mmap[..])
    }

    /// Parse CSV from raw bytes (testable without files).
    pub fn parse_csv_bytes(data: &[u8]) -> Result<Self> {
        let mut candles: Vec<Candle> = Vec::with_capacity(data.len() / 48);

        let mut pos = match memchr::memchr(b'\n', data) {
            Some(nl) => nl + 1, // skip header
            None => return Self::from_candles(Vec::new()),
        };

        while pos < data.len() {
            let line_end = memchr::memchr(b'\n', &data[pos..])
                .map(|i| pos + i)
                .unwrap_or(data.len());
            let mut line = &data[pos..line_end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if !line.is_empty() {
                candles.push(parse_row(line)?);
            }
            pos = line_end + 1;
        }

        candles.sort_by_key(|c| c.time);
        Self::from_candles(candles)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    #[inline]
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    /// Borrow a sub-range of the series, clamped to its bounds.
    pub fn window(&self, start: usize, end: usize) -> &[Candle] {
        let end = end.min(self.candles.len());
        let start = start.min(end);
        &self.candles[start..end]
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }
}

impl Index<usize> for CandleSeries {
    type Output = Candle;

    fn index(&self, index: usize) -> &Candle {
        &self.candles[index]
    }
}

fn parse_row(line: &[u8]) -> Result<Candle> {
    let mut fields: [&[u8]; 6] = [&[]; 6];
    let mut start = 0;
    let mut n = 0;
    for end in memchr::memchr_iter(b',', line) {
        if n >= 5 {
            break;
        }
        fields[n] = &line[start..end];
        start = end + 1;
        n += 1;
    }
    fields[n] = &line[start..];
    if n < 5 {
        return Err(SimError::Parse(format!("expected 6 columns, got {}", n + 1)));
    }

    let time = parse_timestamp(fields[0])?;
    let num = |bytes: &[u8], name: &str| -> Result<f64> {
        fast_float::parse(bytes).map_err(|_| SimError::Parse(format!("bad {name} field")))
    };

    Ok(Candle {
        time,
        open: num(fields[1], "open")?,
        high: num(fields[2], "high")?,
        low: num(fields[3], "low")?,
        close: num(fields[4], "close")?,
        volume: num(fields[5], "volume")?,
    })
}

/// Parse a unix-seconds or ISO8601 timestamp to epoch seconds.
fn parse_timestamp(bytes: &[u8]) -> Result<i64> {
    if !bytes.contains(&b'T') {
        if let Ok(ts) = fast_float::parse::<f64, _>(bytes) {
            return Ok(ts as i64);
        }
    }

    // YYYY-MM-DDTHH:MM:SS with optional Z or +00:00 suffix
    if bytes.len() < 19 {
        return Err(SimError::Parse(format!(
            "timestamp too short: {}",
            String::from_utf8_lossy(bytes)
        )));
    }
    let s = std::str::from_utf8(&bytes[..19])
        .map_err(|_| SimError::Parse("non-UTF8 timestamp".into()))?;

    let field = |range: std::ops::Range<usize>, name: &str| -> Result<i64> {
        s[range]
            .parse()
            .map_err(|_| SimError::Parse(format!("bad {name} in timestamp")))
    };
    let year = field(0..4, "year")?;
    let month = field(5..7, "month")?;
    let day = field(8..10, "day")?;
    let hour = field(11..13, "hour")?;
    let minute = field(14..16, "minute")?;
    let second = field(17..19, "second")?;

    let days = days_from_civil(year as i32, month as u32, day as u32);
    Ok(days * 86400 + hour * 3600 + minute * 60 + second)
}

/// Civil date to days since the Unix epoch (Howard Hinnant algorithm).
fn days_from_civil(year: i32, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year } as i64;
    let m = if month <= 2 {
        month as i64 + 9
    } else {
        month as i64 - 3
    };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u64;
    let doy = (153 * m as u64 + 2) / 5 + day as u64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe as i64 - 719468
}
