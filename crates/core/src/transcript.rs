//! Transcript representations (SPEC §3).
//!
//! A transcript is written once, on successful job finalisation, as a list
//! of timed segments; every other representation is derived from that list
//! on read, not stored separately.

use crate::ids::JobId;
use serde::{Deserialize, Serialize};

/// One timed span of recognised speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// The five ways a transcript can be requested (SPEC §3, §6 `get_transcript`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptFormat {
    /// Plain text, segments joined by whitespace.
    Text,
    /// `[00:00:01.000 --> 00:00:04.000]  text` per line.
    TimeCoded,
    /// `start\tend\ttext` per line, seconds as decimals.
    TabSeparated,
    /// WebVTT-style cue blocks.
    Captioned,
    /// The segment list itself, as structured data.
    Structured,
}

crate::simple_display! {
    TranscriptFormat {
        Text => "text",
        TimeCoded => "time_coded",
        TabSeparated => "tab_separated",
        Captioned => "captioned",
        Structured => "structured",
    }
}

/// A rendered transcript: either a flat string or the structured segment list.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Text(String),
    Structured(Vec<Segment>),
}

impl Rendered {
    pub fn into_text(self) -> Option<String> {
        match self {
            Rendered::Text(s) => Some(s),
            Rendered::Structured(_) => None,
        }
    }
}

/// A job's finished transcript (SPEC §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub job_id: JobId,
    pub segments: Vec<Segment>,
}

impl Transcript {
    pub fn new(job_id: JobId, segments: Vec<Segment>) -> Self {
        Self { job_id, segments }
    }

    pub fn render(&self, format: TranscriptFormat) -> Rendered {
        match format {
            TranscriptFormat::Text => Rendered::Text(self.render_plain()),
            TranscriptFormat::TimeCoded => Rendered::Text(self.render_time_coded()),
            TranscriptFormat::TabSeparated => Rendered::Text(self.render_tab_separated()),
            TranscriptFormat::Captioned => Rendered::Text(self.render_captioned()),
            TranscriptFormat::Structured => Rendered::Structured(self.segments.clone()),
        }
    }

    fn render_plain(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn render_time_coded(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push_str(&format!(
                "[{} --> {}]  {}\n",
                format_timestamp(segment.start_seconds),
                format_timestamp(segment.end_seconds),
                segment.text.trim(),
            ));
        }
        out
    }

    fn render_tab_separated(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push_str(&format!(
                "{}\t{}\t{}\n",
                segment.start_seconds,
                segment.end_seconds,
                segment.text.trim(),
            ));
        }
        out
    }

    fn render_captioned(&self) -> String {
        let mut out = String::from("WEBVTT\n\n");
        for segment in &self.segments {
            out.push_str(&format!(
                "{} --> {}\n{}\n\n",
                format_timestamp(segment.start_seconds),
                format_timestamp(segment.end_seconds),
                segment.text.trim(),
            ));
        }
        out
    }
}

/// Formats seconds as `HH:MM:SS.mmm`, as used by both the time-coded and
/// captioned representations.
fn format_timestamp(total_seconds: f64) -> String {
    let total_seconds = total_seconds.max(0.0);
    let millis = (total_seconds.fract() * 1000.0).round() as u32;
    let total_whole = total_seconds.trunc() as u64;
    let hours = total_whole / 3600;
    let minutes = (total_whole % 3600) / 60;
    let seconds = total_whole % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

#[cfg(test)]
#[path = "transcript_tests.rs"]
mod tests;
