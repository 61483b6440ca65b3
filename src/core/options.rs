//! User-selected job options and their translation into engine configuration
//!
//! Options are edited in place by the presentation layer; the manager snapshots
//! them when a job is submitted and translates the snapshot with
//! [`Options::to_engine_config`]. Settings travel as a flat JSON object keyed by
//! field name.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::models::{AppError, AppResult};

/// Output file name template, resolved by the engine
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Format selector used when only the audio track is wanted
pub const AUDIO_ONLY_FORMAT: &str = "bestaudio/best";

/// Audio codec for the extraction post-processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    M4a,
    Wav,
    Flac,
}

impl AudioFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "m4a" => Ok(AudioFormat::M4a),
            "wav" => Ok(AudioFormat::Wav),
            "flac" => Ok(AudioFormat::Flac),
            other => Err(format!("unsupported audio format: {other}")),
        }
    }
}

/// Job options as chosen by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Engine format selector ("best", "bestvideo+bestaudio", "136+140", ...)
    pub format: String,
    pub output_path: PathBuf,
    pub extract_audio: bool,
    pub audio_format: AudioFormat,
    /// Engine-specific scale, lower is better ("0" best, "9" worst)
    pub audio_quality: String,
    #[serde(alias = "playlist")]
    pub download_playlist: bool,
    #[serde(alias = "subtitles")]
    pub download_subtitles: bool,
    pub subtitle_lang: String,
    #[serde(alias = "thumbnail")]
    pub download_thumbnail: bool,
    pub verbose: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            format: "best".to_string(),
            output_path: default_download_dir(),
            extract_audio: false,
            audio_format: AudioFormat::Mp3,
            audio_quality: "0".to_string(),
            download_playlist: false,
            download_subtitles: false,
            subtitle_lang: "en".to_string(),
            download_thumbnail: false,
            verbose: false,
        }
    }
}

/// The user's download directory, falling back to `./downloads`
pub fn default_download_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| {
            dirs.download_dir()
                .map(Path::to_path_buf)
                .or_else(|| Some(dirs.home_dir().join("Downloads")))
        })
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

/// Post-processing step, applied by the engine in list order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key")]
pub enum PostProcessor {
    ExtractAudio { codec: AudioFormat, quality: String },
    EmbedThumbnail,
}

/// Options translated into the engine's configuration dialect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub format: String,
    pub output_template: String,
    pub verbose: bool,
    pub no_playlist: bool,
    pub write_subtitles: bool,
    pub subtitle_langs: Vec<String>,
    pub write_thumbnail: bool,
    pub postprocessors: Vec<PostProcessor>,
}

impl Options {
    /// Translate into engine configuration.
    ///
    /// Never fails: combinations the engine would reject are passed through and the
    /// engine reports them as a job failure.
    pub fn to_engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig {
            format: self.format.clone(),
            output_template: self
                .output_path
                .join(OUTPUT_TEMPLATE)
                .to_string_lossy()
                .into_owned(),
            verbose: self.verbose,
            no_playlist: !self.download_playlist,
            write_subtitles: false,
            subtitle_langs: Vec::new(),
            write_thumbnail: false,
            postprocessors: Vec::new(),
        };

        if self.extract_audio {
            config.format = AUDIO_ONLY_FORMAT.to_string();
            config.postprocessors.push(PostProcessor::ExtractAudio {
                codec: self.audio_format,
                quality: self.audio_quality.clone(),
            });
        }

        if self.download_subtitles {
            config.write_subtitles = true;
            config.subtitle_langs = vec![self.subtitle_lang.clone()];
        }

        // Embedding runs after audio extraction so the thumbnail lands in the final file
        if self.download_thumbnail {
            config.write_thumbnail = true;
            config.postprocessors.push(PostProcessor::EmbedThumbnail);
        }

        config
    }

    /// Export as a flat key-value document
    ///
    /// Fails when a field has no JSON form, e.g. a non-UTF-8 `output_path`.
    pub fn to_settings(&self) -> AppResult<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(AppError::Config(format!(
                "options serialized to {}, expected an object",
                json_kind(&other)
            ))),
        }
    }

    /// Apply a settings document on top of the current values.
    ///
    /// Unknown keys are ignored, missing keys keep their current value and a
    /// recognized key carrying a value of the wrong type is skipped.
    pub fn apply_settings(&mut self, doc: &Map<String, Value>) -> ImportReport {
        let mut report = ImportReport::default();

        for (key, value) in doc {
            let outcome = match key.as_str() {
                "format" => assign(&mut self.format, value),
                "output_path" => assign(&mut self.output_path, value),
                "extract_audio" => assign(&mut self.extract_audio, value),
                "audio_format" => assign(&mut self.audio_format, value),
                "audio_quality" => assign_quality(&mut self.audio_quality, value),
                "download_playlist" | "playlist" => assign(&mut self.download_playlist, value),
                "download_subtitles" | "subtitles" => {
                    assign(&mut self.download_subtitles, value)
                }
                "subtitle_lang" => assign(&mut self.subtitle_lang, value),
                "download_thumbnail" | "thumbnail" => {
                    assign(&mut self.download_thumbnail, value)
                }
                "verbose" => assign(&mut self.verbose, value),
                _ => {
                    debug!("Ignoring unknown settings key: {}", key);
                    report.ignored.push(key.clone());
                    continue;
                }
            };

            match outcome {
                Ok(()) => report.applied.push(key.clone()),
                Err(err) => {
                    warn!("Rejected settings value for {}: {}", key, err);
                    report.rejected.push((key.clone(), err.to_string()));
                }
            }
        }

        report
    }

    pub fn export_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_settings()?)?)
    }

    pub fn import_json(&mut self, json: &str) -> AppResult<ImportReport> {
        match serde_json::from_str::<Value>(json)? {
            Value::Object(map) => Ok(self.apply_settings(&map)),
            other => Err(AppError::Config(format!(
                "settings document must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn export_to_file(&self, path: &Path) -> AppResult<()> {
        std::fs::write(path, self.export_json()?)?;
        info!("Exported settings to {:?}", path);
        Ok(())
    }

    pub fn import_from_file(&mut self, path: &Path) -> AppResult<ImportReport> {
        let content = std::fs::read_to_string(path)?;
        let report = self.import_json(&content)?;
        info!(
            "Imported settings from {:?} ({} applied, {} ignored, {} rejected)",
            path,
            report.applied.len(),
            report.ignored.len(),
            report.rejected.len()
        );
        Ok(report)
    }
}

/// Outcome of a settings import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub applied: Vec<String>,
    pub ignored: Vec<String>,
    /// Recognized keys whose value could not be used, with the reason
    pub rejected: Vec<(String, String)>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

fn assign<T: DeserializeOwned>(slot: &mut T, value: &Value) -> Result<(), serde_json::Error> {
    *slot = T::deserialize(value)?;
    Ok(())
}

// Hand-edited documents often carry the quality as a bare number
fn assign_quality(slot: &mut String, value: &Value) -> Result<(), serde_json::Error> {
    match value {
        Value::Number(n) => {
            *slot = n.to_string();
            Ok(())
        }
        other => assign(slot, other),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl EngineConfig {
    /// Render as yt-dlp command-line arguments
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            self.format.clone(),
            "-o".to_string(),
            self.output_template.clone(),
        ];

        args.push(if self.no_playlist {
            "--no-playlist".to_string()
        } else {
            "--yes-playlist".to_string()
        });

        if self.verbose {
            args.push("--verbose".to_string());
        }

        if self.write_subtitles {
            args.push("--write-subs".to_string());
            if !self.subtitle_langs.is_empty() {
                args.push("--sub-langs".to_string());
                args.push(self.subtitle_langs.join(","));
            }
        }

        if self.write_thumbnail {
            args.push("--write-thumbnail".to_string());
        }

        for pp in &self.postprocessors {
            match pp {
                PostProcessor::ExtractAudio { codec, quality } => {
                    args.extend([
                        "-x".to_string(),
                        "--audio-format".to_string(),
                        codec.to_string(),
                        "--audio-quality".to_string(),
                        quality.clone(),
                    ]);
                }
                PostProcessor::EmbedThumbnail => args.push("--embed-thumbnail".to_string()),
            }
        }

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options_at(path: &str) -> Options {
        Options {
            output_path: PathBuf::from(path),
            ..Options::default()
        }
    }

    #[test]
    fn test_default_translation() {
        let config = options_at("/media").to_engine_config();
        assert_eq!(config.format, "best");
        assert_eq!(
            config.output_template,
            PathBuf::from("/media")
                .join(OUTPUT_TEMPLATE)
                .to_string_lossy()
        );
        assert!(config.no_playlist);
        assert!(!config.verbose);
        assert!(!config.write_subtitles);
        assert!(config.subtitle_langs.is_empty());
        assert!(config.postprocessors.is_empty());
    }

    #[test]
    fn test_extract_audio_overrides_format() {
        let mut options = options_at("/media");
        options.format = "136+140".to_string();
        options.extract_audio = true;
        options.audio_format = AudioFormat::Flac;
        options.audio_quality = "5".to_string();

        let config = options.to_engine_config();
        assert_eq!(config.format, AUDIO_ONLY_FORMAT);
        assert_eq!(
            config.postprocessors,
            vec![PostProcessor::ExtractAudio {
                codec: AudioFormat::Flac,
                quality: "5".to_string()
            }]
        );
    }

    #[test]
    fn test_thumbnail_embed_runs_after_audio_extraction() {
        let mut options = options_at("/media");
        options.extract_audio = true;
        options.download_thumbnail = true;

        let config = options.to_engine_config();
        assert!(config.write_thumbnail);
        assert_eq!(config.postprocessors.len(), 2);
        assert!(matches!(
            config.postprocessors[0],
            PostProcessor::ExtractAudio { .. }
        ));
        assert_eq!(config.postprocessors[1], PostProcessor::EmbedThumbnail);
    }

    #[test]
    fn test_inactive_fields_are_tolerated() {
        let mut options = options_at("/media");
        options.audio_format = AudioFormat::Wav;
        options.subtitle_lang = "de".to_string();

        let config = options.to_engine_config();
        assert_eq!(config.format, "best");
        assert!(config.postprocessors.is_empty());
        assert!(!config.write_subtitles);
    }

    #[test]
    fn test_subtitles_and_playlist() {
        let mut options = options_at("/media");
        options.download_subtitles = true;
        options.subtitle_lang = "fr".to_string();
        options.download_playlist = true;

        let config = options.to_engine_config();
        assert!(config.write_subtitles);
        assert_eq!(config.subtitle_langs, vec!["fr".to_string()]);
        assert!(!config.no_playlist);
    }

    #[test]
    fn test_to_args() {
        let mut options = options_at("/media");
        options.extract_audio = true;
        options.download_subtitles = true;
        options.download_thumbnail = true;
        options.verbose = true;

        let args = options.to_engine_config().to_args();
        let joined = args.join(" ");
        assert!(joined.starts_with("-f bestaudio/best -o "));
        assert!(joined.contains("--no-playlist"));
        assert!(joined.contains("--verbose"));
        assert!(joined.contains("--write-subs --sub-langs en"));
        assert!(joined.contains("-x --audio-format mp3 --audio-quality 0"));
        let extract = args.iter().position(|a| a == "-x").unwrap();
        let embed = args.iter().position(|a| a == "--embed-thumbnail").unwrap();
        assert!(extract < embed);
    }

    #[test]
    fn test_import_missing_key_keeps_current_value() {
        let mut options = options_at("/media");
        options.audio_quality = "5".to_string();

        let doc = json!({
            "format": "bestvideo+bestaudio",
            "extract_audio": true,
            "audio_format": "m4a",
            "verbose": true
        });
        let report = options.apply_settings(doc.as_object().unwrap());

        assert!(report.is_clean());
        assert_eq!(report.applied.len(), 4);
        assert_eq!(options.audio_quality, "5");
        assert_eq!(options.format, "bestvideo+bestaudio");
        assert!(options.extract_audio);
        assert_eq!(options.audio_format, AudioFormat::M4a);
        assert!(options.verbose);
    }

    #[test]
    fn test_import_ignores_unknown_and_rejects_bad_values() {
        let mut options = options_at("/media");
        let doc = json!({
            "theme": "dark",
            "extract_audio": "yes",
            "audio_format": "ogg",
            "audio_quality": 9,
            "thumbnail": true
        });
        let report = options.apply_settings(doc.as_object().unwrap());

        assert_eq!(report.ignored, vec!["theme".to_string()]);
        assert_eq!(report.rejected.len(), 2);
        assert!(!options.extract_audio);
        assert_eq!(options.audio_format, AudioFormat::Mp3);
        assert_eq!(options.audio_quality, "9");
        assert!(options.download_thumbnail);
    }

    #[test]
    fn test_export_uses_field_names() {
        let settings = options_at("/media").to_settings().unwrap();
        for key in [
            "format",
            "output_path",
            "extract_audio",
            "audio_format",
            "audio_quality",
            "download_playlist",
            "download_subtitles",
            "subtitle_lang",
            "download_thumbnail",
            "verbose",
        ] {
            assert!(settings.contains_key(key), "missing {key}");
        }
        assert_eq!(settings["audio_format"], json!("mp3"));
    }

    #[cfg(unix)]
    #[test]
    fn test_export_fails_for_non_utf8_output_path() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let options = Options {
            output_path: PathBuf::from(OsStr::from_bytes(b"/media/\xff")),
            ..Options::default()
        };

        assert!(matches!(
            options.export_json(),
            Err(AppError::Serialization(_))
        ));
        assert!(options.export_to_file(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_file_round_trip_and_non_object_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut original = options_at("/media");
        original.download_subtitles = true;
        original.subtitle_lang = "ja".to_string();
        original.export_to_file(&path).unwrap();

        let mut restored = Options::default();
        let report = restored.import_from_file(&path).unwrap();
        assert!(report.is_clean());
        assert_eq!(restored, original);

        let mut options = Options::default();
        assert!(matches!(
            options.import_json("[1, 2, 3]"),
            Err(AppError::Config(_))
        ));
    }
}
