use super::*;

#[test]
fn default_settings_are_valid() {
    JobSettings::builder().build().validate().unwrap();
}

#[test]
fn min_speakers_above_max_is_rejected() {
    let settings = JobSettings::builder()
        .diarisation(true)
        .min_speakers(Some(4))
        .max_speakers(Some(2))
        .build();
    let err = settings.validate().unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[test]
fn speaker_bounds_require_diarisation() {
    let settings = JobSettings::builder().min_speakers(Some(1)).build();
    assert!(settings.validate().is_err());
}

#[test]
fn zero_beam_size_is_rejected() {
    let settings = JobSettings::builder()
        .decoder(DecoderParams {
            beam_size: 0,
            ..DecoderParams::default()
        })
        .build();
    assert!(settings.validate().is_err());
}

#[test]
fn empty_model_is_rejected() {
    let settings = JobSettings::builder().model("").build();
    assert!(settings.validate().is_err());
}
