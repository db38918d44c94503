//! Per-user transcription settings records (SPEC §3).

use crate::error::{CoreError, CoreResult};
use crate::ids::{SettingsId, UserId};
use serde::{Deserialize, Serialize};

/// Decoder-level knobs, grouped separately because they tune the model's
/// search rather than what it's asked to recognise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderParams {
    pub beam_size: u32,
    pub temperature: f64,
    pub compute_type: String,
}

impl Default for DecoderParams {
    fn default() -> Self {
        Self {
            beam_size: 5,
            temperature: 0.0,
            compute_type: "float16".into(),
        }
    }
}

/// A recipe of transcription parameters a user can save and reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSettings {
    pub id: SettingsId,
    pub user_id: UserId,
    /// At most one settings row per user may have this set (SPEC §3, §8.5).
    pub is_default: bool,
    pub model: String,
    /// `None` means auto-detect.
    pub language: Option<String>,
    pub align_words: bool,
    pub diarisation: bool,
    pub min_speakers: Option<u32>,
    pub max_speakers: Option<u32>,
    pub vad_filter: bool,
    pub decoder: DecoderParams,
}

impl JobSettings {
    /// Checks the constraints a caller-supplied settings payload must satisfy
    /// before the store will accept it.
    pub fn validate(&self) -> CoreResult<()> {
        let mut errors = Vec::new();
        if self.model.trim().is_empty() {
            errors.push("model must not be empty".to_string());
        }
        if let (Some(min), Some(max)) = (self.min_speakers, self.max_speakers) {
            if min > max {
                errors.push("min_speakers must not exceed max_speakers".to_string());
            }
        }
        if self.min_speakers.is_some() && !self.diarisation {
            errors.push("min_speakers requires diarisation to be enabled".to_string());
        }
        if self.max_speakers.is_some() && !self.diarisation {
            errors.push("max_speakers requires diarisation to be enabled".to_string());
        }
        if self.decoder.beam_size == 0 {
            errors.push("decoder.beam_size must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.decoder.temperature) {
            errors.push("decoder.temperature must be within [0.0, 1.0]".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::validation(errors.join("; ")))
        }
    }
}

crate::builder! {
    pub struct JobSettingsBuilder => JobSettings {
        into {
            model: String = "base",
        }
        set {
            id: SettingsId = SettingsId::new(1),
            user_id: UserId = UserId::new(1),
            is_default: bool = false,
            language: Option<String> = None,
            align_words: bool = false,
            diarisation: bool = false,
            min_speakers: Option<u32> = None,
            max_speakers: Option<u32> = None,
            vad_filter: bool = true,
            decoder: DecoderParams = DecoderParams::default(),
        }
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
