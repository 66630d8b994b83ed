//! SRT subtitle sidecar formatting (§6).

use vcore_models::TranscriptSegment;

/// Renders a video's transcript segments as a standard SRT file: one cue
/// per segment, sequential numbering from 1, `HH:MM:SS,mmm` timestamps.
pub fn render_srt(segments: &[TranscriptSegment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        out.push_str(&format!("{}\n", i + 1));
        out.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(segment.t_start),
            format_timestamp(segment.t_end)
        ));
        out.push_str(&segment.text);
        out.push_str("\n\n");
    }
    out
}

fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0).round() as i64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;
    format!("{hours:02}:{mins:02}:{secs:02},{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcore_models::VideoId;

    #[test]
    fn formats_zero_as_floor_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00:00,000");
    }

    #[test]
    fn formats_fractional_seconds() {
        assert_eq!(format_timestamp(6.5), "00:00:06,500");
        assert_eq!(format_timestamp(3661.25), "01:01:01,250");
    }

    #[test]
    fn renders_sequential_cues() {
        let segments = vec![
            TranscriptSegment::new(VideoId::from_string("vid-1"), 0, 0.0, 6.0, "hello"),
            TranscriptSegment::new(VideoId::from_string("vid-1"), 1, 6.0, 12.0, "world"),
        ];
        let srt = render_srt(&segments);
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:06,000\nhello\n\n"));
        assert!(srt.contains("2\n00:00:06,000 --> 00:00:12,000\nworld\n\n"));
    }
}
