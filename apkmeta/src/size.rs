const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "EB"];

/// Human readable size with two decimals, e.g. `1.50MB`.
///
/// Sizes of 1024 TB and above are all reported in the last unit, counted in
/// multiples of 1024^5.
pub fn format_size(bytes: u64) -> String {
    let mut rank = 0;
    while rank + 1 < UNITS.len() && bytes >= 1u64 << (10 * (rank + 1)) {
        rank += 1;
    }
    let value = bytes as f64 / (1u64 << (10 * rank)) as f64;
    format!("{:.2}{}", value, UNITS[rank])
}
