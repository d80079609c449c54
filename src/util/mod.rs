pub mod env;
pub mod telemetry;

/// Performs `&str` comparisons in constant time in an attempt to close any and all side-channels
/// that might leak information about our key
pub fn constant_time_cmp(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
