//! Parsing of duration strings and Kubernetes resource quantities

use crate::error::QuantityError;

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Split `"15min"` into `(15.0, "min")`
fn split_number(input: &str) -> Result<(f64, &str), QuantityError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(QuantityError::Empty);
    }
    let idx = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(idx);
    let value = number
        .parse::<f64>()
        .map_err(|_| QuantityError::InvalidNumber(input.to_string()))?;
    Ok((value, unit.trim()))
}

/// Parse a measurement duration such as `"15min"` or `"60sec"` into seconds
pub fn parse_duration_secs(input: &str) -> Result<i64, QuantityError> {
    let (value, unit) = split_number(input)?;
    let factor = match unit.to_ascii_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
        _ => {
            return Err(QuantityError::UnknownUnit {
                input: input.to_string(),
                unit: unit.to_string(),
            })
        }
    };
    Ok((value * factor).round() as i64)
}

/// Parse a Kubernetes memory quantity (`"512Mi"`, `"2G"`, `"1048576"`) into bytes
pub fn parse_memory_bytes(input: &str) -> Result<f64, QuantityError> {
    let (value, unit) = split_number(input)?;
    let factor = match unit {
        "" => 1.0,
        "Ki" => 1024.0,
        "Mi" => BYTES_PER_MB,
        "Gi" => BYTES_PER_MB * 1024.0,
        "Ti" => BYTES_PER_MB * 1024.0 * 1024.0,
        "k" | "K" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        _ => {
            return Err(QuantityError::UnknownUnit {
                input: input.to_string(),
                unit: unit.to_string(),
            })
        }
    };
    Ok(value * factor)
}

/// Parse a CPU quantity (`"500m"`, `"1.5"`) into cores
pub fn parse_cpu_cores(input: &str) -> Result<f64, QuantityError> {
    let (value, unit) = split_number(input)?;
    match unit {
        "" => Ok(value),
        "m" => Ok(value / 1000.0),
        _ => Err(QuantityError::UnknownUnit {
            input: input.to_string(),
            unit: unit.to_string(),
        }),
    }
}

pub fn bytes_to_mb(bytes: f64) -> f64 {
    bytes / BYTES_PER_MB
}

pub fn mb_to_bytes(mb: f64) -> f64 {
    mb * BYTES_PER_MB
}
