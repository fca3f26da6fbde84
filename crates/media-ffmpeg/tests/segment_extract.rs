mod support;

use media_ffmpeg::{
    SegmentRequest, extract_segment, list_encoders, probe_media, supported_mime_types,
};

#[test]
fn extracted_audio_segment_has_requested_length() {
    if !support::ffmpeg_available() {
        eprintln!("skipping: ffmpeg not installed");
        return;
    }
    let encoders = list_encoders().expect("list encoders");
    let Some(mime_type) = supported_mime_types(&encoders, true).into_iter().next() else {
        eprintln!("skipping: no audio encoder available");
        return;
    };
    let sample = support::make_sample_video("segment", 3.0);

    let bytes = extract_segment(&SegmentRequest {
        input: sample.clone(),
        start_seconds: 0.5,
        end_seconds: 2.0,
        mime_type: mime_type.clone(),
    })
    .expect("segment should encode");
    assert!(!bytes.is_empty());

    let output = sample.with_extension(format!("segment.{}", extension_for(&mime_type)));
    std::fs::write(&output, &bytes).expect("write segment");
    let info = probe_media(&output).expect("probe segment");
    assert!(info.first_video().is_none());
    assert_eq!(info.audio_track_count(), 1);
    if let Some(duration) = info.duration_seconds {
        assert!((duration - 1.5).abs() < 0.25, "duration {duration}");
    }
}

#[test]
fn encoder_listing_is_not_empty() {
    if !support::ffmpeg_available() {
        eprintln!("skipping: ffmpeg not installed");
        return;
    }
    let encoders = list_encoders().expect("list encoders");
    assert!(!encoders.is_empty());
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type.split(';').next().unwrap_or_default() {
        "audio/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/mp4" => "m4a",
        _ => "mp3",
    }
}
