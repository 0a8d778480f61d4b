//! CSV replay source: turns recorded cook logs into per-channel readings.
//!
//! Expected columns: timestamp, smoker, food A, food B. The first row is a
//! header. Empty temperature cells are probe gaps.

use crate::reading::encode_reading;
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct CsvReading {
    pub timestamp: NaiveDateTime,
    /// Smoker, food A, food B, in channel order.
    pub temperatures: [Option<f64>; 3],
}

impl CsvReading {
    /// Wire payloads for each channel, in channel order.
    pub fn payloads(&self, timestamp_format: &str) -> [String; 3] {
        self.temperatures
            .map(|temperature| encode_reading(self.timestamp, temperature, timestamp_format))
    }
}

fn parse_cell(raw: Option<&str>, column: &str) -> Result<Option<f64>> {
    let trimmed = raw.unwrap_or("").trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value = trimmed
        .parse::<f64>()
        .with_context(|| format!("invalid {column} temperature {trimmed:?}"))?;
    Ok(Some(value))
}

pub fn parse_record(record: &csv::StringRecord, timestamp_format: &str) -> Result<CsvReading> {
    let raw_ts = record
        .get(0)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("row has no timestamp"))?;
    let timestamp = NaiveDateTime::parse_from_str(raw_ts, timestamp_format)
        .with_context(|| format!("timestamp {raw_ts:?} does not match {timestamp_format:?}"))?;

    Ok(CsvReading {
        timestamp,
        temperatures: [
            parse_cell(record.get(1), "smoker")?,
            parse_cell(record.get(2), "food A")?,
            parse_cell(record.get(3), "food B")?,
        ],
    })
}

/// Reads every row. Rows that fail to parse are logged and skipped.
pub fn read_readings<R: Read>(reader: R, timestamp_format: &str) -> Result<Vec<CsvReading>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut readings = Vec::new();
    for (idx, record) in csv_reader.records().enumerate() {
        let record = record.context("read csv row")?;
        match parse_record(&record, timestamp_format) {
            Ok(reading) => readings.push(reading),
            Err(err) => {
                tracing::warn!(row = idx + 2, error = %err, "skipping malformed csv row");
            }
        }
    }
    Ok(readings)
}

pub fn load_readings(path: &Path, timestamp_format: &str) -> Result<Vec<CsvReading>> {
    let file = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    read_readings(file, timestamp_format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{decode_reading, DEFAULT_TIMESTAMP_FORMAT};
    use std::io::Write;

    const SAMPLE_CSV: &str = "\
Time (UTC),Channel1 Smoker Temp,Channel2 Food A Temp,Channel3 Food B Temp
10/29/23 12:00:00,35,,
10/29/23 12:00:30,35.5,32.25,
not a time,36,33,34
10/29/23 12:01:00,,33,34.5
10/29/23 12:01:30,37,warm,35
";

    #[test]
    fn reads_rows_and_skips_malformed_ones() -> Result<()> {
        let readings = read_readings(SAMPLE_CSV.as_bytes(), DEFAULT_TIMESTAMP_FORMAT)?;
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].temperatures, [Some(35.0), None, None]);
        assert_eq!(readings[1].temperatures, [Some(35.5), Some(32.25), None]);
        assert_eq!(readings[2].temperatures, [None, Some(33.0), Some(34.5)]);
        assert_eq!(
            readings[2].timestamp.format("%H:%M:%S").to_string(),
            "12:01:00"
        );
        Ok(())
    }

    #[test]
    fn payloads_decode_on_the_consumer_side() -> Result<()> {
        let readings = read_readings(SAMPLE_CSV.as_bytes(), DEFAULT_TIMESTAMP_FORMAT)?;
        let payloads = readings[2].payloads(DEFAULT_TIMESTAMP_FORMAT);
        assert_eq!(payloads[0], "10/29/23 12:01:00,None");
        for (payload, expected) in payloads.iter().zip(readings[2].temperatures) {
            let sample = decode_reading(payload.as_bytes(), DEFAULT_TIMESTAMP_FORMAT)?;
            assert_eq!(sample.temperature, expected);
            assert_eq!(sample.timestamp, readings[2].timestamp);
        }
        Ok(())
    }

    #[test]
    fn loads_from_file() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(SAMPLE_CSV.as_bytes())?;
        let readings = load_readings(file.path(), DEFAULT_TIMESTAMP_FORMAT)?;
        assert_eq!(readings.len(), 3);
        assert!(load_readings(Path::new("/nonexistent.csv"), DEFAULT_TIMESTAMP_FORMAT).is_err());
        Ok(())
    }
}
