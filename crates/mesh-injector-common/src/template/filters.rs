//! Custom filters for container templates
//!
//! - `flag`: render a boolean as the "1"/"0" strings Envoy's bootstrap expects

/// Flag filter - booleans become "1" or "0"
///
/// Usage: `{{ enable_stats_tags | flag }}`
pub fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_filter() {
        assert_eq!(flag(true), "1");
        assert_eq!(flag(false), "0");
    }
}
