//! Memory quantity parsing
//!
//! Converts annotation values and metrics-API quantities into byte counts.
//! Recognized forms follow the Kubernetes resource-quantity convention:
//! a bare integer or decimal number of bytes, decimal SI suffixes
//! (`k`, `m`, `g`, `t`, `p`, `e`, case-insensitive) and binary suffixes
//! (`Ki`, `Mi`, `Gi`, `Ti`, `Pi`, `Ei`, case-sensitive as written).

use thiserror::Error;

/// The value did not match any recognized quantity pattern
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid memory threshold format: {value:?}")]
pub struct InvalidThresholdFormat {
    pub value: String,
}

impl InvalidThresholdFormat {
    fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

const KILO: u64 = 1000;
const KIBI: u64 = 1024;

fn suffix_multiplier(suffix: &str) -> Option<u64> {
    // Binary suffixes are matched exactly; decimal suffixes ignore case.
    let decimal_power = |unit: char| match unit.to_ascii_lowercase() {
        'k' => Some(1),
        'm' => Some(2),
        'g' => Some(3),
        't' => Some(4),
        'p' => Some(5),
        'e' => Some(6),
        _ => None,
    };

    match suffix {
        "" => Some(1),
        "Ki" => Some(KIBI),
        "Mi" => Some(KIBI.pow(2)),
        "Gi" => Some(KIBI.pow(3)),
        "Ti" => Some(KIBI.pow(4)),
        "Pi" => Some(KIBI.pow(5)),
        "Ei" => Some(KIBI.pow(6)),
        _ => {
            let mut chars = suffix.chars();
            match (chars.next(), chars.next()) {
                (Some(unit), None) => decimal_power(unit).map(|power| KILO.pow(power)),
                _ => None,
            }
        }
    }
}

/// Parse a quantity string into a byte count.
///
/// The numeric part may be an integer or a decimal; the result is truncated
/// to whole bytes. Parsing is pure: malformed input returns an error and
/// nothing else happens.
pub fn parse_quantity(value: &str) -> Result<u64, InvalidThresholdFormat> {
    let value = value.trim();

    let numeric_end = value
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, _)| i)
        .unwrap_or(value.len());
    let (numeric, suffix) = value.split_at(numeric_end);

    if numeric.is_empty() || !numeric.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(InvalidThresholdFormat::new(value));
    }

    let multiplier = suffix_multiplier(suffix).ok_or_else(|| InvalidThresholdFormat::new(value))?;

    match numeric.split_once('.') {
        None => numeric
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(multiplier))
            .ok_or_else(|| InvalidThresholdFormat::new(value)),
        Some((int_part, frac_part)) => {
            if frac_part.contains('.') {
                return Err(InvalidThresholdFormat::new(value));
            }
            let whole: f64 = format!("{}.{}", int_part, if frac_part.is_empty() { "0" } else { frac_part })
                .parse()
                .map_err(|_| InvalidThresholdFormat::new(value))?;
            let bytes = whole * multiplier as f64;
            if !bytes.is_finite() || bytes < 0.0 || bytes >= u64::MAX as f64 {
                return Err(InvalidThresholdFormat::new(value));
            }
            Ok(bytes as u64)
        }
    }
}
