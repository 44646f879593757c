/// Whole-number percentage of `part` in `whole`, 0 when `whole` is 0
pub fn percentage(part: u32, whole: u32) -> u32 {
    match whole {
        positive if positive > 0 => ((part as f64 / whole as f64) * 100.0).round() as u32,
        _ => 0,
    }
}

/// Case-folded, trimmed cache key for a word
pub fn normalize_key(word: &str) -> String {
    word.trim().to_lowercase()
}
