//! Strict string-to-number conversions
//!
//! Quantities pulled out of output files arrive as substrings of free-form
//! report lines. These helpers accept a value only when the entire trimmed
//! input contributes to it; trailing garbage or overflow yields `None` and
//! the caller falls back to its default. Nothing here panics.

/// Parse a floating-point value, requiring full consumption of the trimmed input.
pub fn parse_f64(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => None,
    }
}

/// Parse a signed integer, requiring full consumption of the trimmed input.
pub fn parse_i64(s: &str) -> Option<i64> {
    s.trim().parse::<i64>().ok()
}

/// Parse an unsigned size, requiring full consumption of the trimmed input.
pub fn parse_usize(s: &str) -> Option<usize> {
    s.trim().parse::<usize>().ok()
}

/// Parse the leading `<number><k|m|g|t>` token of a memory string into MB.
///
/// `default_unit_mb` gives the multiplier applied when no suffix is present:
/// SLURM strings default to MB, PBS strings default to bytes. Returns `None`
/// when no digits lead the string.
pub fn parse_memory_mb(s: &str, default_is_bytes: bool) -> Option<u64> {
    let trimmed = s.trim();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    if digits_end == 0 {
        return None;
    }
    let value: f64 = trimmed[..digits_end].parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    let suffix = trimmed[digits_end..]
        .trim()
        .chars()
        .next()
        .map(|c| c.to_ascii_lowercase());

    let mb = match suffix {
        Some('k') => value / 1024.0,
        Some('m') => value,
        Some('g') => value * 1024.0,
        Some('t') => value * 1024.0 * 1024.0,
        Some('b') | None => {
            if default_is_bytes {
                value / (1024.0 * 1024.0)
            } else {
                value
            }
        }
        _ => value,
    };

    Some(mb as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_f64_accepts_clean_values() {
        assert_eq!(parse_f64("-76.12345"), Some(-76.12345));
        assert_eq!(parse_f64("  0.01  "), Some(0.01));
        assert_eq!(parse_f64("1e3"), Some(1000.0));
    }

    #[test]
    fn test_parse_f64_rejects_partial_consumption() {
        assert_eq!(parse_f64("-76.1 Hartrees"), None);
        assert_eq!(parse_f64("abc"), None);
        assert_eq!(parse_f64(""), None);
        assert_eq!(parse_f64("nan"), None);
        assert_eq!(parse_f64("inf"), None);
    }

    #[test]
    fn test_parse_i64() {
        assert_eq!(parse_i64("42"), Some(42));
        assert_eq!(parse_i64(" -7 "), Some(-7));
        assert_eq!(parse_i64("7.0"), None);
        assert_eq!(parse_i64("7x"), None);
    }

    #[test]
    fn test_parse_memory_mb_slurm_defaults() {
        // SLURM: bare numbers are MB
        assert_eq!(parse_memory_mb("2048", false), Some(2048));
        assert_eq!(parse_memory_mb("4g", false), Some(4096));
        assert_eq!(parse_memory_mb("2048k", false), Some(2));
        assert_eq!(parse_memory_mb("1t", false), Some(1024 * 1024));
    }

    #[test]
    fn test_parse_memory_mb_pbs_defaults() {
        // PBS: bare numbers are bytes
        assert_eq!(parse_memory_mb("2147483648", true), Some(2048));
        assert_eq!(parse_memory_mb("4gb", true), Some(4096));
        assert_eq!(parse_memory_mb("512mb", true), Some(512));
    }

    #[test]
    fn test_parse_memory_mb_garbage() {
        assert_eq!(parse_memory_mb("", false), None);
        assert_eq!(parse_memory_mb("lots", false), None);
    }
}
