use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use regex::Regex;
use std::convert::TryFrom;
use std::sync::OnceLock;

use crate::utils::error::Error;

/// Sign, mantissa and an optional suffix (decimal exponent, binary or decimal SI).
const QUANTITY_PATTERN: &str =
    r"^([+-]?)([0-9]+(?:\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+|[KMGTPE]i|[numkMGTPE])?$";

fn quantity_regex() -> &'static Regex {
    static QUANTITY_REGEX: OnceLock<Regex> = OnceLock::new();
    QUANTITY_REGEX.get_or_init(|| Regex::new(QUANTITY_PATTERN).expect("quantity pattern compiles"))
}

/// Scale of a quantity suffix: a power of ten, or a power of 1024.
enum Scale {
    Decimal(i32),
    Binary(u32),
}

fn suffix_scale(suffix: &str) -> Option<Scale> {
    let scale = match suffix {
        "" => Scale::Decimal(0),
        "n" => Scale::Decimal(-9),
        "u" => Scale::Decimal(-6),
        "m" => Scale::Decimal(-3),
        "k" => Scale::Decimal(3),
        "M" => Scale::Decimal(6),
        "G" => Scale::Decimal(9),
        "T" => Scale::Decimal(12),
        "P" => Scale::Decimal(15),
        "E" => Scale::Decimal(18),
        "Ki" => Scale::Binary(1),
        "Mi" => Scale::Binary(2),
        "Gi" => Scale::Binary(3),
        "Ti" => Scale::Binary(4),
        "Pi" => Scale::Binary(5),
        "Ei" => Scale::Binary(6),
        exponent => Scale::Decimal(exponent[1..].parse().ok()?),
    };

    Some(scale)
}

/// Returns the value of `quantity` multiplied by 1000, as an exact integer.
///
/// CPU quantities come out in millicores, memory quantities in milli-bytes.
/// Fractions of a milli-unit are rounded away from zero and values outside the
/// `i64` range saturate, mirroring how the API server reports `MilliValue`.
///
/// # Arguments
/// - `quantity` - A Kubernetes quantity such as `100m`, `1.5`, `256Mi` or `1e3`.
pub fn milli_value(quantity: &Quantity) -> Result<i64, Error> {
    let invalid = || Error::InvalidQuantity(quantity.0.clone());

    let captures = quantity_regex()
        .captures(quantity.0.trim())
        .ok_or_else(invalid)?;

    let negative = &captures[1] == "-";
    let number = &captures[2];
    let suffix = captures.get(3).map_or("", |m| m.as_str());

    let (whole, fraction) = match number.find('.') {
        Some(dot) => (&number[..dot], &number[dot + 1..]),
        None => (number, ""),
    };

    let digits = format!("{}{}", whole, fraction);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }

    let mut mantissa: i128 = digits.parse().map_err(|_| invalid())?;
    let mut exponent: i64 = 3 - fraction.len() as i64;

    match suffix_scale(suffix).ok_or_else(invalid)? {
        Scale::Decimal(power) => exponent += i64::from(power),
        Scale::Binary(power) => {
            mantissa = match mantissa.checked_mul(1i128 << (10 * power)) {
                Some(scaled) => scaled,
                None => return Ok(saturate(negative)),
            }
        }
    }

    let magnitude = if exponent >= 0 {
        let factor = match pow10(exponent) {
            Some(factor) => factor,
            None => return Ok(saturate(negative)),
        };
        match mantissa.checked_mul(factor) {
            Some(value) => value,
            None => return Ok(saturate(negative)),
        }
    } else {
        match pow10(-exponent) {
            Some(divisor) => mantissa / divisor + i128::from(mantissa % divisor != 0),
            // the mantissa fits in i128, so it is smaller than the divisor
            None => 1,
        }
    };

    if magnitude > i128::from(i64::MAX) {
        return Ok(saturate(negative));
    }

    let magnitude = magnitude as i64;
    Ok(if negative { -magnitude } else { magnitude })
}

fn pow10(exponent: i64) -> Option<i128> {
    u32::try_from(exponent)
        .ok()
        .and_then(|exponent| 10i128.checked_pow(exponent))
}

fn saturate(negative: bool) -> i64 {
    if negative {
        i64::MIN
    } else {
        i64::MAX
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    use super::milli_value;

    fn milli(value: &str) -> i64 {
        milli_value(&Quantity(value.to_string())).unwrap()
    }

    #[test]
    fn can_parse_cpu_quantities() {
        assert_eq!(milli("100m"), 100);
        assert_eq!(milli("1"), 1000);
        assert_eq!(milli("1.5"), 1500);
        assert_eq!(milli("0.25"), 250);
        assert_eq!(milli(".5"), 500);
    }

    #[test]
    fn can_parse_memory_quantities() {
        assert_eq!(milli("100k"), 100_000_000);
        assert_eq!(milli("100G"), 100_000_000_000_000);
        assert_eq!(milli("100Mi"), 104_857_600_000);
        assert_eq!(milli("4Gi"), 4_294_967_296_000);
        assert_eq!(milli("1e3"), 1_000_000);
        assert_eq!(milli("1P"), 1_000_000_000_000_000_000);
    }

    #[test]
    fn rounds_fractional_milli_values_up() {
        assert_eq!(milli("1u"), 1);
        assert_eq!(milli("1500u"), 2);
        assert_eq!(milli("-1500u"), -2);
        assert_eq!(milli("0"), 0);
        assert_eq!(milli("0.000"), 0);
    }

    #[test]
    fn saturates_huge_values() {
        assert_eq!(milli("16Ei"), i64::MAX);
        assert_eq!(milli("-16Ei"), i64::MIN);
        assert_eq!(milli("1e30"), i64::MAX);
    }

    #[test]
    fn rejects_malformed_quantities() {
        for bad in &["", "abc", "1.2.3", "10Xi", "m", "1 m", "1e"] {
            assert!(
                milli_value(&Quantity(bad.to_string())).is_err(),
                "{:?} should not parse",
                bad
            );
        }
    }
}
