use std::path::PathBuf;
use std::process::Command;

/// Returns false when the ffmpeg CLI tools are not installed.
pub fn ffmpeg_available() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .output()
            .is_ok_and(|output| output.status.success())
    })
}

/// Synthesizes a 160x90 test pattern with a sine tone.
pub fn make_sample_video(label: &str, seconds: f64) -> PathBuf {
    let output = std::env::temp_dir().join(format!(
        "subclip-{label}-{}-{}.mkv",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock must be after unix epoch")
            .as_nanos()
    ));

    let status = Command::new("ffmpeg")
        .args([
            "-y",
            "-v",
            "error",
            "-f",
            "lavfi",
            "-i",
            "testsrc=size=160x90:rate=30",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=440:sample_rate=48000",
            "-t",
        ])
        .arg(format!("{seconds}"))
        .args(["-pix_fmt", "yuv420p"])
        .arg(&output)
        .output()
        .expect("ffmpeg must run");

    assert!(
        status.status.success(),
        "ffmpeg command must succeed: {}",
        String::from_utf8_lossy(&status.stderr)
    );
    output
}
