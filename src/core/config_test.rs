//! Configuration unit tests
//!
//! Covers loading, persistence and validation of AppConfig

#[cfg(test)]
mod tests {
    use super::super::config::{AppConfig, EngineSettings, LoggingConfig, ManagerSettings};
    use super::super::options::{AudioFormat, Options};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn create_test_config() -> AppConfig {
        AppConfig {
            options: Options {
                format: "bestvideo+bestaudio".to_string(),
                output_path: PathBuf::from("/test/downloads"),
                extract_audio: true,
                audio_format: AudioFormat::Flac,
                audio_quality: "5".to_string(),
                download_subtitles: true,
                subtitle_lang: "de".to_string(),
                ..Options::default()
            },
            manager: ManagerSettings {
                max_concurrent_jobs: Some(3),
            },
            engine: EngineSettings {
                yt_dlp_path: PathBuf::from("/opt/yt-dlp"),
                extra_args: vec!["--no-mtime".to_string()],
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
            },
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.manager.max_concurrent_jobs.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.options, Options::default());
        assert_eq!(config.engine, EngineSettings::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = create_test_config();

        config.save_to(&path).unwrap();
        assert!(path.exists());

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "options": { "format": "worst", "thumbnail": true }, "logging": { "level": "warn" } }"#,
        )
        .unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.options.format, "worst");
        assert!(loaded.options.download_thumbnail);
        assert_eq!(loaded.options.audio_quality, "0");
        assert_eq!(loaded.logging.level, "warn");
        assert_eq!(loaded.manager, ManagerSettings::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = create_test_config();
        config.manager.max_concurrent_jobs = Some(0);
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.engine.yt_dlp_path = PathBuf::new();
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }
}
