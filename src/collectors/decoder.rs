//! Payload decoder for patient case reports
//!
//! Turns an opaque payload (UTF-8, JSON object shaped) into a typed [`Event`].
//! Numeric fields that are absent decode as zero; anything that cannot be read
//! as a case report at all is rejected with a [`DecodeError`].
//! Temperatures outside the range a patient can have are rejected as well.

use crate::error::DecodeError;
use crate::events::{Event, Severity, SymptomSet, Timestamp};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Lowest accepted temperature (°F); zero is what a missing reading decodes to
pub const MIN_TEMPERATURE: f64 = 0.0;
/// Highest accepted temperature (°F)
pub const MAX_TEMPERATURE: f64 = 130.0;

/// Wire shape of a case report as emitted by the report producer
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReport {
    #[serde(default)]
    patient_id: Option<String>,
    #[serde(default)]
    hospital: Option<String>,
    #[serde(default)]
    symptoms: Option<RawSymptoms>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    temperature: Option<RawNumber>,
    #[serde(default)]
    timestamp: Option<RawTimestamp>,
    #[serde(default, alias = "isCluster")]
    cluster: Option<bool>,
}

/// Numbers may arrive bare or quoted
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(f64),
    Text(String),
}

/// Epoch milliseconds (bare or quoted) or an RFC 3339 string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Fractional(f64),
    Text(String),
}

/// Comma-separated list or JSON array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSymptoms {
    List(Vec<String>),
    Csv(String),
}

/// Decode a raw payload into an [`Event`]
///
/// # Errors
///
/// - `DecodeError::NotUtf8` if the payload is not valid UTF-8
/// - `DecodeError::Malformed` if it is not a JSON object of the expected shape
/// - `DecodeError::MissingField` if no hospital is given
/// - `DecodeError::InvalidField` for unparseable numbers, timestamps or severities,
///   and for temperatures outside `MIN_TEMPERATURE..=MAX_TEMPERATURE`
pub fn decode(payload: &[u8]) -> Result<Event, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|e| DecodeError::NotUtf8(e.to_string()))?;
    decode_str(text)
}

/// Decode a payload that is already known to be text
pub fn decode_str(text: &str) -> Result<Event, DecodeError> {
    let raw: RawReport =
        serde_json::from_str(text.trim()).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let hospital = raw
        .hospital
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .ok_or(DecodeError::MissingField("hospital"))?;

    let severity = match raw.severity {
        Some(value) => Severity::parse(&value).ok_or(DecodeError::InvalidField {
            field: "severity",
            value,
        })?,
        None => Severity::Mild,
    };

    let temperature = match raw.temperature {
        Some(number) => parse_number("temperature", number)?,
        None => 0.0,
    };
    if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature) {
        return Err(DecodeError::InvalidField {
            field: "temperature",
            value: temperature.to_string(),
        });
    }

    let timestamp = match raw.timestamp {
        Some(ts) => parse_timestamp(ts)?,
        None => epoch_millis(0)?,
    };

    let symptoms = match raw.symptoms {
        Some(RawSymptoms::List(tokens)) => SymptomSet::from_tokens(tokens),
        Some(RawSymptoms::Csv(list)) => SymptomSet::from_csv(&list),
        None => SymptomSet::default(),
    };

    Ok(Event {
        patient_id: raw.patient_id.unwrap_or_default(),
        hospital,
        symptoms,
        severity,
        temperature,
        timestamp,
        is_cluster: raw.cluster.unwrap_or(false),
    })
}

fn parse_number(field: &'static str, number: RawNumber) -> Result<f64, DecodeError> {
    let value = match number {
        RawNumber::Number(value) => value,
        RawNumber::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().map_err(|_| DecodeError::InvalidField {
                    field,
                    value: text.clone(),
                })?
            }
        }
    };

    if value.is_finite() {
        Ok(value)
    } else {
        Err(DecodeError::InvalidField {
            field,
            value: value.to_string(),
        })
    }
}

fn parse_timestamp(raw: RawTimestamp) -> Result<Timestamp, DecodeError> {
    match raw {
        RawTimestamp::Millis(ms) => epoch_millis(ms),
        RawTimestamp::Fractional(ms) if ms.is_finite() => epoch_millis(ms as i64),
        RawTimestamp::Fractional(ms) => Err(DecodeError::InvalidField {
            field: "timestamp",
            value: ms.to_string(),
        }),
        RawTimestamp::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return epoch_millis(0);
            }
            if let Ok(ms) = trimmed.parse::<i64>() {
                return epoch_millis(ms);
            }
            DateTime::parse_from_rfc3339(trimmed)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| DecodeError::InvalidField {
                    field: "timestamp",
                    value: text.clone(),
                })
        }
    }
}

fn epoch_millis(ms: i64) -> Result<Timestamp, DecodeError> {
    DateTime::from_timestamp_millis(ms).ok_or(DecodeError::InvalidField {
        field: "timestamp",
        value: ms.to_string(),
    })
}
