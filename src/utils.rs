//! Utility helpers shared across modules.

/// Get environment variable with FLOODGATE_ prefix, falling back to the
/// unprefixed version.
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("FLOODGATE_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Current wall-clock time as floating-point seconds since the Unix epoch.
///
/// All rate-limit time arithmetic uses this representation so that
/// fractional token counts and sub-second refill intervals work.
pub fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_now_is_positive() {
        assert!(unix_now() > 0.0);
    }
}
