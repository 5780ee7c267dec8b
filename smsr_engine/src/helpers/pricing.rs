use smsr_common::{MicroUsd, MICROS_PER_CENT};

/// Adds a margin of `markup_bps` basis points to the wholesale price, rounding up to the next whole cent.
#[allow(clippy::cast_possible_truncation)]
pub fn apply_markup(wholesale: MicroUsd, markup_bps: u32) -> MicroUsd {
    let raw = i128::from(wholesale.value()) * (10_000 + i128::from(markup_bps));
    // ceil(raw / 10_000) in micros, then up to whole cents
    let micros = (raw + 9_999).div_euclid(10_000);
    let cent = i128::from(MICROS_PER_CENT);
    let cents = (micros + cent - 1).div_euclid(cent);
    MicroUsd::from((cents * cent) as i64)
}
