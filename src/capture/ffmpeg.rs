use crate::capture::{CaptureError, FrameGrabber, StreamInfo};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Grabs frames by shelling out to `ffmpeg` and probes with `ffprobe`.
///
/// Children are killed when their future is dropped, so an outer timeout
/// never leaves a stray process behind.
#[derive(Debug, Clone)]
pub struct FfmpegGrabber {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    probe_timeout: Duration,
}

impl FfmpegGrabber {
    pub fn new(ffmpeg_path: PathBuf, ffprobe_path: PathBuf, probe_timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            probe_timeout,
        }
    }
}

fn is_rtsp(source_url: &str) -> bool {
    source_url.starts_with("rtsp://") || source_url.starts_with("rtsps://")
}

pub fn capture_args(source_url: &str, output: &Path) -> Vec<String> {
    let mut args = Vec::new();
    if is_rtsp(source_url) {
        args.extend(["-rtsp_transport", "tcp"].map(String::from));
    }
    args.extend(["-analyzeduration", "5000000", "-probesize", "5000000", "-i"].map(String::from));
    args.push(source_url.to_string());
    args.extend(["-frames:v", "1", "-q:v", "2", "-y"].map(String::from));
    args.push(output.to_string_lossy().into_owned());
    args
}

pub fn probe_args(source_url: &str) -> Vec<String> {
    let mut args = vec!["-v".to_string(), "error".to_string()];
    if is_rtsp(source_url) {
        args.extend(["-rtsp_transport", "tcp"].map(String::from));
    }
    args.extend(
        [
            "-analyzeduration",
            "1000000",
            "-probesize",
            "1000000",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,codec_name,r_frame_rate",
            "-of",
            "csv=p=0",
        ]
        .map(String::from),
    );
    args.push(source_url.to_string());
    args
}

/// Parses `codec_name,width,height[,r_frame_rate]` as printed by ffprobe.
pub fn parse_probe_output(stdout: &str) -> Result<StreamInfo, CaptureError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| CaptureError::Probe("no video stream reported".to_string()))?;
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 3 {
        return Err(CaptureError::Probe(format!("unexpected probe output: {line}")));
    }
    let dimension = |value: &str| {
        value
            .parse::<u32>()
            .map_err(|_| CaptureError::Probe(format!("invalid dimension: {value}")))
    };
    Ok(StreamInfo {
        codec_name: fields[0].to_string(),
        width: dimension(fields[1])?,
        height: dimension(fields[2])?,
        frame_rate: fields.get(3).map(|rate| rate.to_string()),
    })
}

fn last_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("no output")
        .trim()
        .to_string()
}

impl FrameGrabber for FfmpegGrabber {
    async fn grab(&self, source_url: &str, output: &Path) -> Result<(), CaptureError> {
        debug!(source = source_url, output = %output.display(), "Running ffmpeg");
        let result = Command::new(&self.ffmpeg_path)
            .args(capture_args(source_url, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !result.status.success() {
            return Err(CaptureError::Failed(format!(
                "ffmpeg exited with {}: {}",
                result.status,
                last_line(&result.stderr)
            )));
        }
        Ok(())
    }

    async fn probe(&self, source_url: &str) -> Result<StreamInfo, CaptureError> {
        let run = Command::new(&self.ffprobe_path)
            .args(probe_args(source_url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        let result = tokio::time::timeout(self.probe_timeout, run)
            .await
            .map_err(|_| CaptureError::Timeout(self.probe_timeout))??;

        if !result.status.success() {
            return Err(CaptureError::Probe(last_line(&result.stderr)));
        }
        parse_probe_output(&String::from_utf8_lossy(&result.stdout))
    }
}
