//! ffprobe JSON output parsing

use crate::error::ProbeError;
use crate::metadata::ProbeReport;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

fn parse_duration(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Turn `ffprobe -print_format json -show_format -show_streams` output into a
/// [`ProbeReport`].
///
/// Width and height are the maxima over video streams. Duration is the first
/// parseable duration of a video stream, falling back to the container's.
pub fn parse_probe_output(stdout: &[u8]) -> Result<ProbeReport, ProbeError> {
    let output: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| ProbeError::InvalidOutput(e.to_string()))?;

    let format = output
        .format
        .as_ref()
        .and_then(|f| f.format_name.as_deref())
        .and_then(|name| name.split(',').next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ProbeError::NoStreams("container format not recognized".to_string()))?
        .to_string();

    let video: Vec<&FfprobeStream> = output
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("video"))
        .collect();

    let width = video.iter().filter_map(|s| s.width).max().unwrap_or(0);
    let height = video.iter().filter_map(|s| s.height).max().unwrap_or(0);

    let duration = video
        .iter()
        .find_map(|s| parse_duration(s.duration.as_deref()))
        .or_else(|| parse_duration(output.format.as_ref().and_then(|f| f.duration.as_deref())));

    if output.streams.is_empty() && duration.is_none() {
        return Err(ProbeError::NoStreams(format!("{} container is empty", format)));
    }

    Ok(ProbeReport {
        format,
        width,
        height,
        duration,
        has_video: !video.is_empty(),
    })
}
