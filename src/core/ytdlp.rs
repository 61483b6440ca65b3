//! yt-dlp engine
//!
//! Drives the yt-dlp executable as a child process. Progress is requested with a
//! machine-readable `--progress-template`, and the resolved metadata is printed
//! once the final file has been moved into place, so both can be parsed from
//! stdout line by line.

use std::borrow::Cow;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;

use tracing::{debug, info, warn};

use crate::core::config::EngineSettings;
use crate::core::engine::{Engine, EngineEvent, EngineFailure, EventSink, Metadata, Phase};
use crate::core::options::EngineConfig;

const PROGRESS_MARKER: &str = "[progress]";
const METADATA_MARKER: &str = "[metadata]";

/// Title goes last: it is the only field that may contain the separator
const PROGRESS_TEMPLATE: &str = "download:[progress]%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(info.title)s";
const METADATA_TEMPLATE: &str = "after_move:[metadata]%(duration)s|%(ext)s|%(title)s";

/// Lines of stderr kept for the failure message
const STDERR_TAIL: usize = 20;

/// Engine backed by the yt-dlp command-line program
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl YtDlpEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            program: settings.yt_dlp_path.clone(),
            extra_args: settings.extra_args.clone(),
        }
    }

    /// Full argument list for one job
    pub fn build_args(&self, url: &str, config: &EngineConfig) -> Vec<String> {
        let mut args = config.to_args();
        args.extend(
            [
                "--newline",
                "--progress",
                "--progress-template",
                PROGRESS_TEMPLATE,
                "--print",
                METADATA_TEMPLATE,
            ]
            .into_iter()
            .map(String::from),
        );
        args.extend(self.extra_args.iter().cloned());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::from_settings(&EngineSettings::default())
    }
}

impl Engine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn extract_and_download(
        &self,
        url: &str,
        config: &EngineConfig,
        sink: &mut dyn EventSink,
    ) -> Result<Metadata, EngineFailure> {
        let args = self.build_args(url, config);
        debug!("Launching {:?} {:?}", self.program, args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                EngineFailure::new(format!("Failed to launch {}: {}", self.program.display(), e))
            })?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                reap(&mut child);
                return Err(EngineFailure::new("yt-dlp output pipes unavailable"));
            }
        };

        // Drained on its own thread so a chatty stderr cannot stall stdout
        let stderr_reader = thread::spawn(move || {
            let mut tail = Vec::new();
            let _ = for_each_line(stderr, |line| {
                debug!("yt-dlp: {}", line);
                if !line.trim().is_empty() {
                    tail.push(line.to_string());
                    if tail.len() > STDERR_TAIL {
                        tail.remove(0);
                    }
                }
            });
            tail
        });

        let mut metadata = None;
        let read = for_each_line(stdout, |line| {
            if let Some(event) = parse_progress_line(line) {
                sink.on_event(event);
            } else if let Some(meta) = parse_metadata_line(line) {
                metadata = Some(meta);
            } else if !line.trim().is_empty() {
                debug!("yt-dlp: {}", line);
            }
        });
        if let Err(e) = read {
            reap(&mut child);
            let _ = stderr_reader.join();
            return Err(EngineFailure::new(format!("Failed to read yt-dlp output: {}", e)));
        }

        let status = match child.wait() {
            Ok(status) => status,
            Err(e) => {
                reap(&mut child);
                let _ = stderr_reader.join();
                return Err(e.into());
            }
        };
        let stderr_tail = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            let message = failure_message(&stderr_tail)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
            warn!("yt-dlp failed for {}: {}", url, message);
            return Err(EngineFailure::new(message));
        }

        let metadata = metadata.unwrap_or_default();
        info!(
            "yt-dlp finished {} ({})",
            url,
            metadata.title.as_deref().unwrap_or("untitled")
        );
        Ok(metadata)
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Feed every line of `stream` to `f`, without line terminators.
///
/// Lines that are not UTF-8 (titles on legacy Windows consoles) are decoded as
/// Windows-1252 instead of aborting the read.
fn for_each_line(stream: impl Read, mut f: impl FnMut(&str)) -> io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = decode_line(&buf);
        f(line.trim_end_matches(['\r', '\n']));
    }
}

fn decode_line(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(line) => Cow::Borrowed(line),
        Err(_) => encoding_rs::WINDOWS_1252
            .decode_without_bom_handling(bytes)
            .0,
    }
}

fn field(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    match raw {
        "" | "NA" | "None" => None,
        value => Some(value),
    }
}

fn number(raw: &str) -> Option<f64> {
    field(raw)?.parse::<f64>().ok().filter(|n| n.is_finite())
}

// Byte counts are floats when yt-dlp only has an estimate
fn bytes(raw: &str) -> Option<u64> {
    number(raw).filter(|n| *n >= 0.0).map(|n| n as u64)
}

/// Parse one line emitted through the progress template
pub fn parse_progress_line(line: &str) -> Option<EngineEvent> {
    let rest = line.trim_end().strip_prefix(PROGRESS_MARKER)?;
    let mut parts = rest.splitn(6, '|');
    let phase = Phase::parse(field(parts.next()?)?);

    Some(EngineEvent {
        phase,
        downloaded_bytes: parts.next().and_then(bytes),
        total_bytes: parts.next().and_then(bytes),
        total_bytes_estimate: parts.next().and_then(bytes),
        speed: parts.next().and_then(number),
        title: parts.next().and_then(field).map(str::to_string),
    })
}

/// Parse the line printed after the final file was moved into place
pub fn parse_metadata_line(line: &str) -> Option<Metadata> {
    let rest = line.trim_end().strip_prefix(METADATA_MARKER)?;
    let mut parts = rest.splitn(3, '|');

    Some(Metadata {
        duration_seconds: parts.next().and_then(number),
        ext: parts.next().and_then(field).map(str::to_string),
        title: parts.next().and_then(field).map(str::to_string),
    })
}

/// Pick the most useful line out of yt-dlp's stderr
fn failure_message(stderr_tail: &[String]) -> Option<String> {
    stderr_tail
        .iter()
        .rev()
        .find_map(|line| line.strip_prefix("ERROR:").map(|m| m.trim().to_string()))
        .or_else(|| stderr_tail.last().cloned())
}
