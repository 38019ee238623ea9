//! Conversion of raw SNMP values into typed sensor values.
//!
//! Everything here is pure. Numeric strings from the appliance may use
//! either `.` or `,` as the decimal separator with the other one grouping
//! thousands; they are always resolved to a plain `f64` before reaching a
//! consumer.

use crate::error::{MonitorError, Result};
use crate::metrics::data::SensorValue;
use crate::snmp::RawVariable;
use serde::{Deserialize, Serialize};

const CENTIGRADE_TOKEN: &str = "Centigrade:";

/// How a raw value should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Integer, counter or numeric string; non-numeric strings are kept as text
    Numeric,
    /// Kilobytes, reported in mebibytes
    KilobytesToMib,
    /// Vendor dual-unit temperature string, reported in °C
    Temperature,
    /// TimeTicks, reported in seconds
    Uptime,
    /// Capacity with an optional unit suffix, reported in GB
    Capacity,
    /// Free text (model, vendor, names)
    Text,
}

/// Normalize one raw value. SNMP exception values become `Unavailable`.
pub fn normalize(raw: &RawVariable, kind: SensorKind) -> Result<SensorValue> {
    if raw.is_exception() {
        return Ok(SensorValue::Unavailable);
    }

    match kind {
        SensorKind::Numeric => Ok(numeric(raw)),
        SensorKind::Text => Ok(SensorValue::Text(text(raw))),
        SensorKind::KilobytesToMib => match numeric(raw).as_f64() {
            Some(kb) => Ok(SensorValue::Float(kb_to_mib(kb))),
            None => Ok(SensorValue::Unavailable),
        },
        SensorKind::Uptime => Ok(match raw {
            RawVariable::TimeTicks(ticks) => SensorValue::Float(ticks_to_seconds(u64::from(*ticks))),
            other => match numeric(other).as_f64() {
                Some(ticks) if ticks >= 0.0 => SensorValue::Float(ticks_to_seconds(ticks as u64)),
                _ => SensorValue::Unavailable,
            },
        }),
        SensorKind::Temperature => match raw {
            RawVariable::Integer(c) => Ok(SensorValue::Float(*c as f64)),
            RawVariable::Unsigned(c) => Ok(SensorValue::Float(*c as f64)),
            other => parse_wd_temperature(&text(other)).map(SensorValue::Float),
        },
        SensorKind::Capacity => match raw {
            RawVariable::Integer(gb) => Ok(SensorValue::Float(*gb as f64)),
            RawVariable::Unsigned(gb) => Ok(SensorValue::Float(*gb as f64)),
            other => Ok(parse_capacity_gb(&text(other))
                .map(SensorValue::Float)
                .unwrap_or(SensorValue::Unavailable)),
        },
    }
}

fn text(raw: &RawVariable) -> String {
    match raw {
        RawVariable::OctetString(bytes) => String::from_utf8_lossy(bytes)
            .trim_matches(|c: char| c.is_whitespace() || c == '\0')
            .to_string(),
        other => other.to_string(),
    }
}

fn numeric(raw: &RawVariable) -> SensorValue {
    match raw {
        RawVariable::Integer(v) => SensorValue::Integer(*v),
        RawVariable::Unsigned(v) => match i64::try_from(*v) {
            Ok(v) => SensorValue::Integer(v),
            Err(_) => SensorValue::Float(*v as f64),
        },
        RawVariable::TimeTicks(v) => SensorValue::Integer(i64::from(*v)),
        other => {
            let text = text(other);
            match parse_locale_number(&text) {
                Some(value) => SensorValue::Float(value),
                None if text.is_empty() => SensorValue::Unavailable,
                None => SensorValue::Text(text),
            }
        }
    }
}

/// Parse a numeric string whose decimal separator may be `.` or `,`.
///
/// With both separators present, the last one is the decimal separator and
/// the other groups thousands. With only one kind present, a single
/// occurrence is the decimal separator and repeated occurrences group
/// thousands, so `"1.234"` reads as 1.234.
pub fn parse_locale_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}' | '\''))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let dots = cleaned.matches('.').count();
    let commas = cleaned.matches(',').count();
    let canonical = match (dots, commas) {
        (0, 0) => cleaned,
        (_, 0) if dots == 1 => cleaned,
        (_, 0) => cleaned.replace('.', ""),
        (0, 1) => cleaned.replace(',', "."),
        (0, _) => cleaned.replace(',', ""),
        _ => {
            let last_dot = cleaned.rfind('.')?;
            let last_comma = cleaned.rfind(',')?;
            let (decimal, grouping) = if last_comma > last_dot { (',', '.') } else { ('.', ',') };
            if cleaned.matches(decimal).count() != 1 {
                return None;
            }
            cleaned.replace(grouping, "").replace(decimal, ".")
        }
    };

    if !canonical
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
    {
        return None;
    }
    canonical.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Extract °C from the vendor format `"Centigrade:48 \tFahrenheit:118"`.
pub fn parse_wd_temperature(raw: &str) -> Result<f64> {
    let unparseable = || MonitorError::UnparseableTemperature(raw.to_string());
    let start = raw.find(CENTIGRADE_TOKEN).ok_or_else(unparseable)? + CENTIGRADE_TOKEN.len();
    let rest = raw[start..].trim_start();

    let end = rest
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    rest[..end]
        .parse::<i64>()
        .map(|c| c as f64)
        .map_err(|_| unparseable())
}

/// Kilobytes to mebibytes.
pub fn kb_to_mib(kb: f64) -> f64 {
    kb / 1024.0
}

/// TimeTicks (1/100 s) to seconds, rounded to a tenth.
pub fn ticks_to_seconds(ticks: u64) -> f64 {
    (ticks as f64 / 10.0).round() / 10.0
}

/// Parse `"1.82 TB"`, `"3,64TB"`, `"500 GB"` or a bare number (already GB).
pub fn parse_capacity_gb(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let split = trimmed
        .char_indices()
        .find(|(_, c)| c.is_ascii_alphabetic())
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let value = parse_locale_number(number)?;
    let factor = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "GB" | "G" => 1.0,
        "B" => 1e-9,
        "KB" | "K" => 1e-6,
        "MB" | "M" => 1e-3,
        "TB" | "T" => 1e3,
        "PB" | "P" => 1e6,
        _ => return None,
    };
    Some(value * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_number_table() {
        let cases: &[(&str, Option<f64>)] = &[
            ("1.354.752,0", Some(1354752.0)),
            ("1,354,752.0", Some(1354752.0)),
            ("1.234", Some(1.234)),
            ("1,5", Some(1.5)),
            ("1,234,567", Some(1234567.0)),
            ("1.234.567", Some(1234567.0)),
            ("0.15", Some(0.15)),
            ("42", Some(42.0)),
            ("-3,25", Some(-3.25)),
            (" 1 354 752,5 ", Some(1354752.5)),
            ("1.234,5,6", None),
            ("", None),
            ("abc", None),
            ("inf", None),
            ("NaN", None),
            ("12 kB", None),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_locale_number(input), *expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_memory_conversion_from_grouped_string() {
        let kb = parse_locale_number("1.354.752,0").unwrap();
        assert_eq!(kb, 1354752.0);
        assert_eq!(kb_to_mib(kb), 1323.0);

        let value = normalize(&RawVariable::octet_string("1.354.752,0"), SensorKind::KilobytesToMib);
        assert_eq!(value, Ok(SensorValue::Float(1323.0)));
        let value = normalize(&RawVariable::Integer(2_048), SensorKind::KilobytesToMib);
        assert_eq!(value, Ok(SensorValue::Float(2.0)));
    }

    #[test]
    fn test_wd_temperature() {
        assert_eq!(parse_wd_temperature("Centigrade:48 \tFahrenheit:118"), Ok(48.0));
        assert_eq!(parse_wd_temperature("Centigrade: 35\tFahrenheit:95"), Ok(35.0));
        assert_eq!(parse_wd_temperature("Centigrade:-2 \tFahrenheit:28"), Ok(-2.0));
        assert!(matches!(
            parse_wd_temperature("Fahrenheit:118"),
            Err(MonitorError::UnparseableTemperature(_))
        ));
        assert!(matches!(
            parse_wd_temperature("48"),
            Err(MonitorError::UnparseableTemperature(_))
        ));
        assert!(matches!(
            parse_wd_temperature("Centigrade:"),
            Err(MonitorError::UnparseableTemperature(_))
        ));
    }

    #[test]
    fn test_temperature_kind() {
        let raw = RawVariable::octet_string("Centigrade:48 \tFahrenheit:118");
        assert_eq!(normalize(&raw, SensorKind::Temperature), Ok(SensorValue::Float(48.0)));
        assert_eq!(
            normalize(&RawVariable::Integer(41), SensorKind::Temperature),
            Ok(SensorValue::Float(41.0))
        );
        assert!(normalize(&RawVariable::octet_string("warm"), SensorKind::Temperature).is_err());
    }

    #[test]
    fn test_exceptions_become_unavailable() {
        for raw in [
            RawVariable::NoSuchObject,
            RawVariable::NoSuchInstance,
            RawVariable::EndOfMibView,
        ] {
            for kind in [SensorKind::Numeric, SensorKind::Temperature, SensorKind::Text] {
                assert_eq!(normalize(&raw, kind), Ok(SensorValue::Unavailable));
            }
        }
    }

    #[test]
    fn test_numeric_kind() {
        assert_eq!(
            normalize(&RawVariable::Integer(-5), SensorKind::Numeric),
            Ok(SensorValue::Integer(-5))
        );
        assert_eq!(
            normalize(&RawVariable::Unsigned(u64::MAX), SensorKind::Numeric),
            Ok(SensorValue::Float(u64::MAX as f64))
        );
        assert_eq!(
            normalize(&RawVariable::octet_string("0.15"), SensorKind::Numeric),
            Ok(SensorValue::Float(0.15))
        );
        assert_eq!(
            normalize(&RawVariable::octet_string("Running"), SensorKind::Numeric),
            Ok(SensorValue::Text("Running".into()))
        );
        assert_eq!(
            normalize(&RawVariable::octet_string("  "), SensorKind::Numeric),
            Ok(SensorValue::Unavailable)
        );
    }

    #[test]
    fn test_uptime_kind() {
        assert_eq!(
            normalize(&RawVariable::TimeTicks(360_045), SensorKind::Uptime),
            Ok(SensorValue::Float(3600.5))
        );
        assert_eq!(ticks_to_seconds(123_456), 1234.6);
    }

    #[test]
    fn test_capacity_parsing() {
        assert_eq!(parse_capacity_gb("1.82 TB"), Some(1820.0));
        assert_eq!(parse_capacity_gb("3,64TB"), Some(3640.0));
        assert_eq!(parse_capacity_gb("500 GB"), Some(500.0));
        assert_eq!(parse_capacity_gb("931"), Some(931.0));
        assert_eq!(parse_capacity_gb("12 furlongs"), None);
        assert_eq!(
            normalize(&RawVariable::octet_string("garbage"), SensorKind::Capacity),
            Ok(SensorValue::Unavailable)
        );
    }

    #[test]
    fn test_text_trims_padding() {
        let raw = RawVariable::OctetString(b"WDC WD40EFRX \0".to_vec());
        assert_eq!(
            normalize(&raw, SensorKind::Text),
            Ok(SensorValue::Text("WDC WD40EFRX".into()))
        );
    }
}
