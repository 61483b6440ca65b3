//! Tracing subscriber setup shared by the library and the CLI

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(level: &str) -> String {
    format!("media_downloader={}", level.to_ascii_lowercase())
}

/// Install the global fmt subscriber. `RUST_LOG` wins over `level`; a second
/// call is a no-op.
pub fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(level).into());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_targets_crate() {
        assert_eq!(default_filter("DEBUG"), "media_downloader=debug");
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing("info");
        init_tracing("debug");
    }
}
