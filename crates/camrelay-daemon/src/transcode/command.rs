//! Structured transcoder invocation.
//!
//! The argument template is fixed; the variable slots (analysis duration,
//! input codec, relay port, output URL) are validated at construction and
//! rendered deterministically by [`TranscodeCommand::build_args`].

use super::manager::TranscodeError;

/// Fixed output-tuning options appended to every invocation: low-latency
/// HLS segmenting, ultrafast encode preset, 15-frame GOP, timestamp
/// regeneration.
const OUTPUT_OPTIONS: &[&str] = &[
    "-hls_init_time",
    "0",
    "-hls_time",
    "1",
    "-hls_segment_type",
    "mpegts",
    "-hls_playlist_type",
    "event",
    "-hls_list_size",
    "0",
    "-preset",
    "ultrafast",
    "-tune",
    "zerolatency",
    "-g",
    "15",
    "-sc_threshold",
    "0",
    "-fflags",
    "genpts+nobuffer+flush_packets",
    "-loglevel",
    "debug",
];

/// Input format tag substituted into the `-f` slot.
///
/// The legacy `h265` tag is not a registered demuxer name; it maps to
/// `hevc`. Every other codec value passes through unchanged.
fn input_format(codec: &str) -> &str {
    if codec == "h265" { "hevc" } else { codec }
}

/// A validated transcoder invocation.
#[derive(Debug, Clone)]
pub struct TranscodeCommand {
    analyze_duration: u64,
    input_codec: String,
    port: u16,
    stream_url: String,
    write_report: bool,
}

impl TranscodeCommand {
    /// Build an invocation for the given relay port and camera values.
    ///
    /// `analyze_duration` is the microseconds of input the transcoder
    /// inspects before demuxing starts.
    pub fn new(
        analyze_duration: u64,
        input_codec: impl Into<String>,
        port: u16,
        stream_url: impl Into<String>,
    ) -> Result<Self, TranscodeError> {
        let input_codec = input_codec.into();
        let stream_url = stream_url.into();
        if input_codec.trim().is_empty() {
            return Err(TranscodeError::InvalidCommand {
                reason: "input codec is empty".to_string(),
            });
        }
        if stream_url.trim().is_empty() {
            return Err(TranscodeError::InvalidCommand {
                reason: "stream URL is empty".to_string(),
            });
        }
        Ok(Self {
            analyze_duration,
            input_codec,
            port,
            stream_url,
            write_report: false,
        })
    }

    /// Ask the transcoder to write a report file alongside its logs.
    pub fn with_report(mut self, write_report: bool) -> Self {
        self.write_report = write_report;
        self
    }

    /// Render the full argument list in template order: input clause,
    /// codec-copy, output tuning, RTSP output clause.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-analyzeduration".to_string(),
            self.analyze_duration.to_string(),
            "-f".to_string(),
            input_format(&self.input_codec).to_string(),
            "-i".to_string(),
            format!("tcp://localhost:{}", self.port),
            "-vcodec".to_string(),
            "copy".to_string(),
        ];
        args.extend(OUTPUT_OPTIONS.iter().map(|s| (*s).to_string()));
        if self.write_report {
            args.push("-report".to_string());
        }
        args.extend([
            "-f".to_string(),
            "rtsp".to_string(),
            "-rtsp_transport".to_string(),
            "tcp".to_string(),
            self.stream_url.clone(),
        ]);
        args
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn command(codec: &str) -> TranscodeCommand {
        TranscodeCommand::new(1_000_000, codec, 40123, "rtsp://localhost:8554/cam").unwrap()
    }

    #[test]
    fn h265_maps_to_hevc_in_codec_slot() {
        let args = command("h265").build_args();
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "hevc");
    }

    #[test]
    fn other_codecs_pass_through_unchanged() {
        for codec in ["h264", "hevc", "mjpeg"] {
            let args = command(codec).build_args();
            let f = args.iter().position(|a| a == "-f").unwrap();
            assert_eq!(args[f + 1], codec);
        }
    }

    #[test]
    fn input_clause_renders_in_template_order() {
        let args = command("h264").build_args();
        assert_eq!(
            &args[..8],
            &[
                "-analyzeduration",
                "1000000",
                "-f",
                "h264",
                "-i",
                "tcp://localhost:40123",
                "-vcodec",
                "copy",
            ]
        );
    }

    #[test]
    fn output_clause_ends_with_stream_url() {
        let args = command("h264").build_args();
        assert_eq!(
            &args[args.len() - 5..],
            &["-f", "rtsp", "-rtsp_transport", "tcp", "rtsp://localhost:8554/cam"]
        );
    }

    #[test]
    fn tuning_options_sit_between_input_and_output_clauses() {
        let args = command("h264").build_args();
        let tuning: Vec<_> = args[8..args.len() - 5].iter().map(String::as_str).collect();
        assert_eq!(tuning, OUTPUT_OPTIONS);
    }

    #[test]
    fn report_flag_is_off_by_default_and_appended_when_set() {
        let args = command("h264").build_args();
        assert!(!args.iter().any(|a| a == "-report"));

        let args = command("h264").with_report(true).build_args();
        let report = args.iter().position(|a| a == "-report").unwrap();
        // After the tuning block, before the output clause.
        assert_eq!(report, args.len() - 6);
    }

    #[test]
    fn empty_codec_is_rejected() {
        let err = TranscodeCommand::new(0, "", 1, "rtsp://localhost:8554/cam").unwrap_err();
        assert!(matches!(err, TranscodeError::InvalidCommand { .. }));
    }

    #[test]
    fn empty_stream_url_is_rejected() {
        let err = TranscodeCommand::new(0, "h264", 1, "  ").unwrap_err();
        assert!(matches!(err, TranscodeError::InvalidCommand { .. }));
    }
}
