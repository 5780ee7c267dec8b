use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("'{0}' is not a valid decimal amount")]
    Invalid(String),
    #[error("'{0}' has more than {1} decimal places")]
    TooPrecise(String, u32),
    #[error("'{0}' is too large")]
    Overflow(String),
}

/// Parses a decimal string such as `"1500.50"` into an integer number of minor units with `decimals` places.
///
/// Gateways report amounts either as integers in minor units or as decimal strings. Floating point never enters the
/// calculation. Trailing zeros beyond `decimals` are accepted; any other extra precision is rejected.
pub fn parse_decimal_amount(value: &str, decimals: u32) -> Result<i64, AmountParseError> {
    let s = value.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    let valid = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !valid(whole) || !valid(frac) {
        return Err(AmountParseError::Invalid(value.to_string()));
    }
    let frac = frac.trim_end_matches('0');
    if frac.len() > decimals as usize {
        return Err(AmountParseError::TooPrecise(value.to_string(), decimals));
    }
    let overflow = || AmountParseError::Overflow(value.to_string());
    let scale = 10i64.checked_pow(decimals).ok_or_else(overflow)?;
    let whole = if whole.is_empty() { 0 } else { whole.parse::<i64>().map_err(|_| overflow())? };
    let frac_val = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = decimals as usize);
        padded.parse::<i64>().map_err(|_| overflow())?
    };
    let total = whole.checked_mul(scale).and_then(|w| w.checked_add(frac_val)).ok_or_else(overflow)?;
    Ok(if negative { -total } else { total })
}

/// Formats minor units as a plain decimal string, e.g. `150050` with 2 decimals is `"1500.50"`.
pub fn format_minor_units(value: i64, decimals: u32) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let scale = 10u64.pow(decimals);
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    format!("{sign}{}.{:0width$}", abs / scale, abs % scale, width = decimals as usize)
}
