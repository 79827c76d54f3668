//! Conversions between the length units used by WordprocessingML.
//!
//! Paragraph geometry is stored in twips (1/20 pt), font sizes in half-points and
//! drawing extents in EMU (English Metric Units, 914400 per inch). Measure attributes
//! are usually bare integers but may also carry a unit suffix such as `12pt` or `2.5cm`.

pub const TWIPS_PER_POINT: i64 = 20;
pub const EMU_PER_TWIP: i64 = 635;

pub fn pt_to_half_points(pt: f64) -> u32 {
    // `as` saturates, so out-of-range values pin to 0 or u32::MAX.
    (pt * 2.0).round().max(0.0) as u32
}

pub fn pt_to_twips(pt: f64) -> i64 {
    (pt * TWIPS_PER_POINT as f64).round() as i64
}

pub fn emu_to_twips(emu: i64) -> i64 {
    // Round half away from zero so 635-multiples map exactly.
    let q = emu / EMU_PER_TWIP;
    let r = emu % EMU_PER_TWIP;
    if r * 2 >= EMU_PER_TWIP {
        q + 1
    } else if r * 2 <= -EMU_PER_TWIP {
        q - 1
    } else {
        q
    }
}

pub fn twips_to_emu(twips: i64) -> i64 {
    twips.saturating_mul(EMU_PER_TWIP)
}

/// Points for a measure with a unit suffix (`pt`, `in`, `cm`, `mm`, `pc`, `pi`).
pub fn universal_measure_to_pt(value: &str) -> Option<f64> {
    let value = value.trim();
    let split = value.len().checked_sub(2)?;
    let (number, unit) = (value.get(..split)?, value.get(split..)?);
    let n: f64 = number.trim().parse().ok()?;
    if !n.is_finite() {
        return None;
    }
    let per_unit = match unit {
        "pt" => 1.0,
        "in" => 72.0,
        "cm" => 72.0 / 2.54,
        "mm" => 72.0 / 25.4,
        "pc" | "pi" => 12.0,
        _ => return None,
    };
    Some(n * per_unit)
}

/// A twips measure: a bare integer, or a universal measure converted to twips.
pub fn parse_twips(value: &str) -> Option<i64> {
    let value = value.trim();
    value
        .parse::<i64>()
        .ok()
        .or_else(|| universal_measure_to_pt(value).map(pt_to_twips))
}

/// A half-point measure (`w:sz`): a bare integer, or a universal measure.
pub fn parse_half_points(value: &str) -> Option<u32> {
    let value = value.trim();
    value
        .parse::<u32>()
        .ok()
        .or_else(|| universal_measure_to_pt(value).map(pt_to_half_points))
}
