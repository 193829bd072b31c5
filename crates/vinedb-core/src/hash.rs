use xxhash_rust::xxh3::{xxh3_64, xxh3_128};

///
/// hex16
///
/// Fixed-width 16-digit hex digest, used wherever a generated
/// identifier must have a length independent of its source names
/// (per-column index names).
///

#[must_use]
pub fn hex16(input: &str) -> String {
    format!("{:016X}", xxh3_64(input.as_bytes()))
}

///
/// hex32
///
/// Fixed-width 32-digit hex digest over the full 128-bit hash; the
/// content-fingerprint form.
///

#[must_use]
pub fn hex32(input: &str) -> String {
    format!("{:032x}", xxh3_128(input.as_bytes()))
}
