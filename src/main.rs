//! media-downloader command line front end
//!
//! Headless presentation layer: submits every URL, drains the inbox on the
//! main task and prints one line per state change.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use media_downloader::utils::{init_tracing, is_http_url};
use media_downloader::{
    load_or_initialize_config, AudioFormat, DownloadManager, JobCallbacks, JobRecord, Options,
    YtDlpEngine, VERSION,
};

#[derive(Parser)]
#[command(name = "media-downloader")]
#[command(version = VERSION)]
#[command(about = "Download videos and audio through yt-dlp with live progress")]
struct Cli {
    /// URLs to download
    #[arg(required_unless_present = "export_settings")]
    urls: Vec<String>,

    /// yt-dlp format selector
    #[arg(short, long)]
    format: Option<String>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Extract audio only, converting to the given codec (mp3, m4a, wav, flac)
    #[arg(long, value_name = "CODEC")]
    audio: Option<AudioFormat>,

    /// Audio quality, 0 (best) to 10 (worst)
    #[arg(long, value_name = "QUALITY")]
    audio_quality: Option<String>,

    /// Download the whole playlist when the URL points into one
    #[arg(long)]
    playlist: bool,

    /// Download subtitles in the given language
    #[arg(long, value_name = "LANG")]
    subs: Option<String>,

    /// Download and embed the thumbnail
    #[arg(long)]
    thumbnail: bool,

    /// Verbose engine output and debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Import job settings from a JSON file before applying flags
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Write the effective job settings to a JSON file
    #[arg(long, value_name = "FILE")]
    export_settings: Option<PathBuf>,

    /// Path to the yt-dlp executable
    #[arg(long, value_name = "PATH")]
    yt_dlp: Option<PathBuf>,

    /// Maximum number of simultaneous downloads
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,
}

impl Cli {
    /// Layer the command line over the persisted options
    fn apply_to(&self, options: &mut Options) {
        if let Some(format) = &self.format {
            options.format = format.clone();
        }
        if let Some(output) = &self.output {
            options.output_path = output.clone();
        }
        if let Some(codec) = self.audio {
            options.extract_audio = true;
            options.audio_format = codec;
        }
        if let Some(quality) = &self.audio_quality {
            options.audio_quality = quality.clone();
        }
        if let Some(lang) = &self.subs {
            options.download_subtitles = true;
            options.subtitle_lang = lang.clone();
        }
        options.download_playlist |= self.playlist;
        options.download_thumbnail |= self.thumbnail;
        options.verbose |= self.verbose;
    }
}

fn format_bytes(bytes: f64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    let mut size = bytes;
    let mut unit_index = 0;
    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{:.0} {}", size, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn progress_line(record: &JobRecord) -> String {
    let speed = record
        .speed_bytes_per_sec
        .map(|s| format!(" @ {}/s", format_bytes(s)))
        .unwrap_or_default();
    format!(
        "[{:>5.1}%] {:<11} {}{}",
        record.progress_percent,
        record.status.as_str(),
        record.title,
        speed
    )
}

fn callbacks() -> JobCallbacks {
    JobCallbacks::new()
        .on_progress(|record| println!("{}", progress_line(record)))
        .on_complete(|record| {
            println!(
                "✅ {} -> {}",
                record.title,
                record.output_path.display()
            )
        })
        .on_error(|record, message| eprintln!("❌ {}: {}", record.url, message))
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = load_or_initialize_config();
    init_tracing(if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    });

    if let Some(path) = &cli.settings {
        let report = config
            .options
            .import_from_file(path)
            .with_context(|| format!("Failed to import settings from {:?}", path))?;
        for (key, reason) in &report.rejected {
            warn!("Ignoring setting {}: {}", key, reason);
        }
    }
    cli.apply_to(&mut config.options);

    if let Some(path) = &cli.export_settings {
        config
            .options
            .export_to_file(path)
            .with_context(|| format!("Failed to export settings to {:?}", path))?;
        println!("Settings written to {}", path.display());
        if cli.urls.is_empty() {
            return Ok(ExitCode::SUCCESS);
        }
    }

    if let Some(path) = &cli.yt_dlp {
        config.engine.yt_dlp_path = path.clone();
    }
    if cli.jobs.is_some() {
        config.manager.max_concurrent_jobs = cli.jobs;
    }
    config.validate()?;

    let engine = Arc::new(YtDlpEngine::from_settings(&config.engine));
    let (manager, mut inbox) =
        DownloadManager::new(engine, config.options.clone(), config.manager.clone())?;

    for url in &cli.urls {
        if !is_http_url(url.trim()) {
            warn!("{} is not an http(s) URL, passing it to yt-dlp as is", url);
        }
        if let Err(e) = manager.submit(url, callbacks()) {
            eprintln!("❌ {}: {}", url, e);
        }
    }

    let mut interrupted = false;
    while manager.stats_snapshot().active > 0 {
        tokio::select! {
            event = inbox.dispatch_next() => {
                if event.is_none() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                for record in manager.in_flight() {
                    manager.cancel(&record.url);
                }
                interrupted = true;
                break;
            }
        }
    }
    inbox.try_dispatch();

    let stats = manager.stats_snapshot();
    info!("Session finished: {:?}", stats);
    println!(
        "{} total, {} completed, {} failed, {} cancelled",
        stats.total, stats.completed, stats.failed, stats.cancelled
    );

    if interrupted {
        return Ok(ExitCode::from(130));
    }
    if stats.failed > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512.0), "512 B");
        assert_eq!(format_bytes(1536.0), "1.5 KB");
        assert_eq!(format_bytes(5.0 * 1024.0 * 1024.0), "5.0 MB");
    }

    #[test]
    fn test_flags_override_options() {
        let cli = Cli::parse_from([
            "media-downloader",
            "--audio",
            "flac",
            "--subs",
            "de",
            "--thumbnail",
            "-o",
            "/tmp/out",
            "https://example.com/v1",
        ]);
        let mut options = Options::default();
        cli.apply_to(&mut options);

        assert!(options.extract_audio);
        assert_eq!(options.audio_format, AudioFormat::Flac);
        assert!(options.download_subtitles);
        assert_eq!(options.subtitle_lang, "de");
        assert!(options.download_thumbnail);
        assert!(!options.download_playlist);
        assert_eq!(options.output_path, PathBuf::from("/tmp/out"));
        assert_eq!(cli.urls, vec!["https://example.com/v1".to_string()]);
    }

    #[test]
    fn test_urls_required_without_export() {
        assert!(Cli::try_parse_from(["media-downloader"]).is_err());
        assert!(Cli::try_parse_from(["media-downloader", "--export-settings", "s.json"]).is_ok());
    }
}
