//! Seed derivation and the seeded trigonometric generator.
//!
//! These two functions are the only source of variation in layout
//! generation, so identical catalogs always produce identical geometry.

/// Stable seed for an entity id: the first 8 hex digits of MD5(id), read as
/// a base-16 integer.
pub fn seed(entity_id: &str) -> u32 {
    let digest = md5::compute(entity_id.as_bytes());
    u32::from_be_bytes([digest.0[0], digest.0[1], digest.0[2], digest.0[3]])
}

/// Fractional part of `sin(seed + index) * 10000`, in `[0, 1)`.
///
/// Evaluated in f64 with the platform `sin`. Renderers porting this must use
/// the same double-precision sine to reproduce positions exactly.
pub fn seeded_random(seed: u64, index: u32) -> f64 {
    let x = ((seed as f64) + f64::from(index)).sin() * 10000.0;
    let fract = x - x.floor();
    // x - floor(x) can round up to exactly 1.0 for tiny negative x
    if fract >= 1.0 {
        0.0
    } else {
        fract
    }
}
