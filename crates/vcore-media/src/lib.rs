//! Media primitive capabilities: transcode, scene-detect, frame-extract,
//! perceptual-hash, transcribe, vision-caption, embed.
//!
//! The pipeline stages in `vcore-worker` depend on these trait contracts,
//! not on any particular implementation. `Ffmpeg*` implementations shell
//! out to the local `ffmpeg`/`ffprobe` binaries; `OpenAi*` implementations
//! call the corresponding OpenAI HTTP endpoints.

pub mod command;
pub mod error;
pub mod frames;
pub mod openai;
pub mod phash;
pub mod probe;
pub mod scenes;
pub mod transcode;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frames::{FfmpegFrameExtractor, FrameExtractor};
pub use openai::{
    ControlEntityPayload, Embedder, OpenAiEmbedder, OpenAiTranscriber, OpenAiVisionCaptioner,
    TextEntityPayload, Transcriber, VisionCaptioner, VisionCaption,
};
pub use phash::{hamming_distance, DctPerceptualHasher, PerceptualHasher};
pub use probe::{get_duration, probe_video, VideoInfo};
pub use scenes::{FfmpegSceneDetector, SceneDetector};
pub use transcode::{FfmpegTranscoder, TranscodeOutput, Transcoder};
