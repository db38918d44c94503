use super::*;

fn sample() -> Transcript {
    Transcript::new(
        JobId::new(42),
        vec![
            Segment {
                start_seconds: 1.0,
                end_seconds: 4.0,
                text: "hello there".into(),
                speaker: None,
                confidence: None,
            },
            Segment {
                start_seconds: 4.5,
                end_seconds: 6.25,
                text: "general kenobi".into(),
                speaker: Some("speaker_1".into()),
                confidence: Some(0.91),
            },
        ],
    )
}

#[test]
fn format_timestamp_pads_to_three_decimals() {
    assert_eq!(format_timestamp(1.0), "00:00:01.000");
    assert_eq!(format_timestamp(4.25), "00:00:04.250");
    assert_eq!(format_timestamp(3661.0), "01:01:01.000");
}

#[test]
fn plain_text_joins_segments_with_whitespace() {
    let text = sample().render(TranscriptFormat::Text).into_text().unwrap();
    assert_eq!(text, "hello there general kenobi");
}

#[test]
fn time_coded_renders_bracketed_ranges() {
    let text = sample()
        .render(TranscriptFormat::TimeCoded)
        .into_text()
        .unwrap();
    assert_eq!(
        text,
        "[00:00:01.000 --> 00:00:04.000]  hello there\n\
         [00:00:04.500 --> 00:00:06.250]  general kenobi\n"
    );
}

#[test]
fn tab_separated_uses_raw_seconds() {
    let text = sample()
        .render(TranscriptFormat::TabSeparated)
        .into_text()
        .unwrap();
    assert_eq!(text, "1\t4\thello there\n4.5\t6.25\tgeneral kenobi\n");
}

#[test]
fn captioned_emits_webvtt_header_and_cues() {
    let text = sample()
        .render(TranscriptFormat::Captioned)
        .into_text()
        .unwrap();
    assert!(text.starts_with("WEBVTT\n\n"));
    assert!(text.contains("00:00:01.000 --> 00:00:04.000\nhello there\n\n"));
}

#[test]
fn structured_preserves_segment_metadata() {
    let rendered = sample().render(TranscriptFormat::Structured);
    match rendered {
        Rendered::Structured(segments) => {
            assert_eq!(segments.len(), 2);
            assert_eq!(segments[1].speaker.as_deref(), Some("speaker_1"));
            assert_eq!(segments[1].confidence, Some(0.91));
        }
        Rendered::Text(_) => panic!("expected structured rendering"),
    }
}
