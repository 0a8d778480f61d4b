use chrono::NaiveDateTime;
use thiserror::Error;

pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%m/%d/%y %H:%M:%S";
const MISSING_TOKEN: &str = "none";

/// One timestamped temperature observation. `temperature` is `None` when the
/// probe reported a gap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: NaiveDateTime,
    pub temperature: Option<f64>,
}

impl Sample {
    pub fn new(timestamp: NaiveDateTime, temperature: Option<f64>) -> Self {
        Self {
            timestamp,
            temperature,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    Utf8,
    #[error("expected 2 comma-separated fields, got {0}")]
    FieldCount(usize),
    #[error("timestamp {raw:?} does not match format {format:?}")]
    Timestamp { raw: String, format: String },
    #[error("invalid temperature {0:?}")]
    Temperature(String),
}

pub fn decode_reading(payload: &[u8], timestamp_format: &str) -> Result<Sample, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::Utf8)?;
    let fields: Vec<&str> = text.trim().split(',').collect();
    if fields.len() != 2 {
        return Err(DecodeError::FieldCount(fields.len()));
    }

    let raw_ts = fields[0].trim();
    let timestamp = NaiveDateTime::parse_from_str(raw_ts, timestamp_format).map_err(|_| {
        DecodeError::Timestamp {
            raw: raw_ts.to_string(),
            format: timestamp_format.to_string(),
        }
    })?;

    let temperature = parse_temperature(fields[1].trim())?;
    Ok(Sample::new(timestamp, temperature))
}

fn parse_temperature(raw: &str) -> Result<Option<f64>, DecodeError> {
    if raw.eq_ignore_ascii_case(MISSING_TOKEN) {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(DecodeError::Temperature(raw.to_string())),
    }
}

/// Wire form used by the producer. Gaps are written as `None`.
pub fn encode_reading(
    timestamp: NaiveDateTime,
    temperature: Option<f64>,
    timestamp_format: &str,
) -> String {
    let ts = timestamp.format(timestamp_format);
    match temperature {
        Some(value) => format!("{ts},{value}"),
        None => format!("{ts},None"),
    }
}
