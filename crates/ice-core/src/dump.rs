//! Plain-text dumps of the system matrix and vectors.
//!
//! One value per line. Integers are written as they are; floating point
//! values use the C `%.6e` layout (`3.000000e+02`), which external
//! comparison scripts expect byte for byte.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Default number of digits after the decimal point.
pub const DEFAULT_PRECISION: usize = 6;

/// Format like C's `%.{precision}e`: signed exponent with at least two
/// digits.
pub fn format_scientific(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let formatted = format!("{:.prec$e}", value, prec = precision);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exponent.abs())
        }
        None => formatted,
    }
}

pub fn write_indices<W: Write>(out: &mut W, values: &[usize]) -> std::io::Result<()> {
    for value in values {
        writeln!(out, "{}", value)?;
    }
    Ok(())
}

pub fn write_values<W: Write>(out: &mut W, values: &[f64], precision: usize) -> std::io::Result<()> {
    for value in values {
        writeln!(out, "{}", format_scientific(*value, precision))?;
    }
    Ok(())
}

/// Create `path` and write one value per line.
pub fn write_values_file(path: &Path, values: &[f64], precision: usize) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_values(&mut out, values, precision)?;
    out.flush()
}

pub fn write_indices_file(path: &Path, values: &[usize]) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_indices(&mut out, values)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_style_exponent() {
        assert_eq!(format_scientific(300.0, 6), "3.000000e+02");
        assert_eq!(format_scientific(-1.5e-7, 6), "-1.500000e-07");
        assert_eq!(format_scientific(0.0, 6), "0.000000e+00");
        assert_eq!(format_scientific(1.0e123, 2), "1.00e+123");
    }

    #[test]
    fn test_write_values() {
        let mut buf = Vec::new();
        write_values(&mut buf, &[1.0, 2.5], 3).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "1.000e+00\n2.500e+00\n");
    }
}
