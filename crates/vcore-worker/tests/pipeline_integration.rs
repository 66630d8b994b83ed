//! End-to-end pipeline tests against hand-rolled fakes (no live Postgres,
//! no live ffmpeg/OpenAI): happy path, resume-after-crash idempotence, a
//! per-frame vision failure that does not fail the job, vision's fallback
//! to sequential dispatch after consecutive failures, and substituting a
//! single stage through `PipelineOrchestrator`'s builder.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use vcore_media::{
    Embedder, FrameExtractor, MediaError, MediaResult, PerceptualHasher, SceneDetector, Transcoder,
    Transcriber, VisionCaptioner,
};
use vcore_media::openai::{ControlEntityPayload, TextEntityPayload, VisionCaption};
use vcore_media::transcode::TranscodeOutput;
use vcore_models::{Frame, FrameCaption, JobId, Scene, TranscriptSegment, Video, VideoId, VideoStatus};
use vcore_storage::{Storage, StorageError, StorageResult};
use vcore_worker::logging::Milestone;
use vcore_worker::pipeline::{run_pipeline, PipelineContext, PipelineOrchestrator, Stage};
use vcore_worker::pipeline::orchestrator::PipelineOutcome;
use vcore_worker::{WorkerConfig, WorkerError, WorkerResult};

/// An in-memory stand-in for `PgStorage`, small enough to hand-write
/// rather than derive — mirrors the teacher's hand-rolled test doubles.
#[derive(Default)]
struct FakeStorage {
    videos: Mutex<HashMap<String, Video>>,
    scenes: Mutex<HashMap<String, Vec<Scene>>>,
    frames: Mutex<HashMap<String, Vec<Frame>>>,
    segments: Mutex<HashMap<String, Vec<TranscriptSegment>>>,
    captions: Mutex<Vec<FrameCaption>>,
}

impl FakeStorage {
    fn with_video(video: Video) -> Self {
        let mut videos = HashMap::new();
        videos.insert(video.id.as_str().to_string(), video);
        Self {
            videos: Mutex::new(videos),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Storage for FakeStorage {
    async fn fetch_video(&self, video_id: &VideoId) -> StorageResult<Video> {
        self.videos
            .lock()
            .unwrap()
            .get(video_id.as_str())
            .cloned()
            .ok_or_else(|| StorageError::not_found(video_id.to_string()))
    }

    async fn update_video_normalized(
        &self,
        video_id: &VideoId,
        normalized_path: &str,
        duration_sec: f64,
    ) -> StorageResult<()> {
        let mut videos = self.videos.lock().unwrap();
        let video = videos.get_mut(video_id.as_str()).unwrap();
        video.normalized_path = Some(normalized_path.to_string());
        video.duration_sec = Some(duration_sec);
        video.status = VideoStatus::Processing;
        Ok(())
    }

    async fn mark_video_ready(&self, video_id: &VideoId) -> StorageResult<()> {
        self.videos
            .lock()
            .unwrap()
            .get_mut(video_id.as_str())
            .unwrap()
            .status = VideoStatus::Ready;
        Ok(())
    }

    async fn scenes_for_video(&self, video_id: &VideoId) -> StorageResult<Vec<Scene>> {
        Ok(self
            .scenes
            .lock()
            .unwrap()
            .get(video_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn bulk_insert_scenes(&self, rows: &[Scene]) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut scenes = self.scenes.lock().unwrap();
        let entry = scenes.entry(rows[0].video_id.as_str().to_string()).or_default();
        for row in rows {
            if !entry.iter().any(|s| s.idx == row.idx) {
                entry.push(row.clone());
            }
        }
        entry.sort_by_key(|s| s.idx);
        Ok(())
    }

    async fn segments_for_video(&self, video_id: &VideoId) -> StorageResult<Vec<TranscriptSegment>> {
        Ok(self
            .segments
            .lock()
            .unwrap()
            .get(video_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn bulk_insert_segments(&self, rows: &[TranscriptSegment]) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut segments = self.segments.lock().unwrap();
        let entry = segments
            .entry(rows[0].video_id.as_str().to_string())
            .or_default();
        for row in rows {
            let dup = entry
                .iter()
                .any(|s| (s.t_start - row.t_start).abs() < 1e-9 && (s.t_end - row.t_end).abs() < 1e-9);
            if !dup {
                entry.push(row.clone());
            }
        }
        entry.sort_by_key(|s| s.idx);
        Ok(())
    }

    async fn segments_missing_embedding(
        &self,
        video_id: &VideoId,
    ) -> StorageResult<Vec<TranscriptSegment>> {
        Ok(self
            .segments
            .lock()
            .unwrap()
            .get(video_id.as_str())
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.embedding.is_none())
            .collect())
    }

    async fn update_segment_embedding(&self, id: &str, vector: &[f32]) -> StorageResult<()> {
        let mut segments = self.segments.lock().unwrap();
        for rows in segments.values_mut() {
            if let Some(row) = rows.iter_mut().find(|s| s.id == id) {
                row.embedding = Some(vector.to_vec());
            }
        }
        Ok(())
    }

    async fn frames_for_video(&self, video_id: &VideoId) -> StorageResult<Vec<Frame>> {
        Ok(self
            .frames
            .lock()
            .unwrap()
            .get(video_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn bulk_insert_frames(&self, rows: &[Frame]) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut frames = self.frames.lock().unwrap();
        let entry = frames.entry(rows[0].video_id.as_str().to_string()).or_default();
        for row in rows {
            if !entry.iter().any(|f| f.id == row.id) {
                entry.push(row.clone());
            }
        }
        entry.sort_by_key(|f| f.idx);
        Ok(())
    }

    async fn frames_missing_caption(&self, video_id: &VideoId) -> StorageResult<Vec<Frame>> {
        let captioned: std::collections::HashSet<String> = self
            .captions
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.frame_id.clone())
            .collect();
        Ok(self
            .frames
            .lock()
            .unwrap()
            .get(video_id.as_str())
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|f| !captioned.contains(&f.id))
            .collect())
    }

    async fn bulk_insert_captions(&self, rows: &[FrameCaption]) -> StorageResult<()> {
        let mut captions = self.captions.lock().unwrap();
        for row in rows {
            if !captions.iter().any(|c| c.id == row.id) {
                captions.push(row.clone());
            }
        }
        Ok(())
    }

    async fn captions_missing_embedding(
        &self,
        video_id: &VideoId,
    ) -> StorageResult<Vec<FrameCaption>> {
        Ok(self
            .captions
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.video_id.as_str() == video_id.as_str() && c.embedding.is_none())
            .cloned()
            .collect())
    }

    async fn update_caption_embedding(&self, id: &str, vector: &[f32]) -> StorageResult<()> {
        let mut captions = self.captions.lock().unwrap();
        if let Some(row) = captions.iter_mut().find(|c| c.id == id) {
            row.embedding = Some(vector.to_vec());
        }
        Ok(())
    }
}

struct FakeTranscoder;

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(
        &self,
        _input: &Path,
        normalized_path: &Path,
        audio_path: &Path,
    ) -> MediaResult<TranscodeOutput> {
        if let Some(parent) = normalized_path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(normalized_path, b"fake-video").await.unwrap();
        tokio::fs::write(audio_path, b"fake-audio").await.unwrap();
        Ok(TranscodeOutput {
            normalized_path: normalized_path.to_path_buf(),
            audio_path: audio_path.to_path_buf(),
            duration_sec: 12.0,
        })
    }
}

struct FakeSceneDetector {
    scenes: Vec<(f64, f64)>,
}

#[async_trait]
impl SceneDetector for FakeSceneDetector {
    async fn detect_scenes(&self, _video_path: &Path) -> MediaResult<Vec<(f64, f64)>> {
        Ok(self.scenes.clone())
    }
}

struct FakeFrameExtractor;

#[async_trait]
impl FrameExtractor for FakeFrameExtractor {
    async fn extract_frame(
        &self,
        _video_path: &Path,
        _timestamp: f64,
        output_path: &Path,
    ) -> MediaResult<()> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(output_path, b"fake-jpeg").await.unwrap();
        Ok(())
    }
}

/// Hashes by the output path's scene index so tests can control which
/// frames collide under the dedup threshold.
struct FakeHasher {
    /// Maps a path's file stem (e.g. `scene_002`) to a hex hash. Paths not
    /// present fall back to a hash derived from the stem, guaranteeing
    /// distinctness unless explicitly aliased here.
    collisions: HashMap<String, String>,
}

#[async_trait]
impl PerceptualHasher for FakeHasher {
    async fn hash(&self, image_path: &Path) -> MediaResult<String> {
        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        if let Some(hash) = self.collisions.get(&stem) {
            return Ok(hash.clone());
        }
        // Distinct per stem: hash the stem's bytes into 16 hex digits.
        let mut acc: u64 = 0xcbf29ce484222325;
        for b in stem.bytes() {
            acc ^= b as u64;
            acc = acc.wrapping_mul(0x100000001b3);
        }
        Ok(format!("{acc:016x}"))
    }
}

struct FakeTranscriber {
    utterances: Vec<(f64, f64, String)>,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> MediaResult<Vec<(f64, f64, String)>> {
        Ok(self.utterances.clone())
    }
}

/// Always returns the same caption, except for frames whose path contains
/// `fail_marker`, which always error (simulating a persistently-invalid
/// vision response per §8 scenario 6).
struct FakeVisionCaptioner {
    fail_marker: Option<String>,
}

#[async_trait]
impl VisionCaptioner for FakeVisionCaptioner {
    async fn caption(&self, image_path: &Path) -> MediaResult<VisionCaption> {
        if let Some(marker) = &self.fail_marker {
            if image_path.to_string_lossy().contains(marker) {
                return Err(MediaError::InvalidResponse("schema mismatch".into()));
            }
        }
        Ok(VisionCaption {
            caption: "screen".to_string(),
            controls: vec![ControlEntityPayload {
                kind: "button".into(),
                label: "play".into(),
                position: "center".into(),
            }],
            text_on_screen: vec![TextEntityPayload {
                text: "HELLO".into(),
                position: "top".into(),
            }],
        })
    }
}

struct FakeEmbedder;

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> MediaResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0, 0.5]).collect())
    }
}

fn test_config(data_dir: &Path) -> WorkerConfig {
    WorkerConfig {
        database_url: String::new(),
        openai_api_key: String::new(),
        data_dir: data_dir.to_string_lossy().to_string(),
        poll_interval: std::time::Duration::from_millis(1),
        max_attempts: 3,
        log_level: "INFO".to_string(),
        max_frames_per_video: 50,
        vision_max_concurrent: 5,
        enable_transcription: true,
        enable_vision_analysis: true,
        enable_embeddings: true,
        dev_http: false,
        http_port: 8000,
        shutdown_timeout: std::time::Duration::from_secs(5),
    }
}

fn build_context(
    storage: Arc<FakeStorage>,
    scenes: Vec<(f64, f64)>,
    utterances: Vec<(f64, f64, String)>,
    fail_marker: Option<String>,
    collisions: HashMap<String, String>,
    data_dir: &Path,
) -> PipelineContext {
    PipelineContext {
        storage,
        transcoder: Arc::new(FakeTranscoder),
        scene_detector: Arc::new(FakeSceneDetector { scenes }),
        frame_extractor: Arc::new(FakeFrameExtractor),
        hasher: Arc::new(FakeHasher { collisions }),
        transcriber: Arc::new(FakeTranscriber { utterances }),
        vision_captioner: Arc::new(FakeVisionCaptioner { fail_marker }),
        embedder: Arc::new(FakeEmbedder),
        config: test_config(data_dir),
    }
}

fn job_id() -> vcore_models::JobId {
    vcore_models::JobId::from_string("job-1")
}

/// §8 scenario 1: a tiny 12s video, 1 scene, 1 frame, 2 transcript
/// segments, 1 caption — everything should land with embeddings filled
/// and the video marked ready by the time the orchestrator returns Done.
#[tokio::test]
async fn happy_path_tiny_video_produces_every_expected_row() {
    let tmp = TempDir::new().unwrap();
    let video_id = VideoId::from_string("vid-1");
    let video = Video::new(video_id.clone(), "uploads/vid-1_clip.mp4");
    let storage = Arc::new(FakeStorage::with_video(video));

    let ctx = build_context(
        storage.clone(),
        vec![(0.0, 12.0)],
        vec![(0.0, 6.0, "hello".to_string()), (6.0, 12.0, "world".to_string())],
        None,
        HashMap::new(),
        tmp.path(),
    );

    let outcome = run_pipeline(&ctx, &job_id(), &video_id).await;
    assert!(matches!(outcome, PipelineOutcome::Done));

    assert_eq!(storage.scenes_for_video(&video_id).await.unwrap().len(), 1);
    let frames = storage.frames_for_video(&video_id).await.unwrap();
    assert_eq!(frames.len(), 1);

    let segments = storage.segments_for_video(&video_id).await.unwrap();
    assert_eq!(segments.len(), 2);
    assert!(segments.iter().all(|s| s.embedding.is_some()));

    let captions = storage.captions.lock().unwrap().clone();
    assert_eq!(captions.len(), 1);
    assert!(captions[0].embedding.is_some());

    assert_eq!(
        storage.videos.lock().unwrap().get("vid-1").unwrap().status,
        VideoStatus::Ready
    );

    let sidecar = tmp.path().join("subs").join("vid-1.srt");
    assert!(sidecar.exists());
}

/// §8 scenario 4: complete stages 1-3, simulate a crash by constructing a
/// fresh orchestrator run over the same storage/filesystem state, and
/// confirm the second run produces no duplicate rows and reaches the same
/// final state as a crashless run.
#[tokio::test]
async fn resume_after_partial_completion_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let video_id = VideoId::from_string("vid-1");
    let video = Video::new(video_id.clone(), "uploads/vid-1_clip.mp4");
    let storage = Arc::new(FakeStorage::with_video(video));

    let scenes = vec![(0.0, 12.0)];
    let utterances = vec![(0.0, 6.0, "hello".to_string()), (6.0, 12.0, "world".to_string())];

    // First attempt runs only normalize/transcribe/scenes, simulating a
    // crash before frames/vision/embeddings.
    {
        let ctx = build_context(
            storage.clone(),
            scenes.clone(),
            utterances.clone(),
            None,
            HashMap::new(),
            tmp.path(),
        );
        vcore_worker::pipeline::normalize::run(&ctx, &video_id).await.unwrap();
        vcore_worker::pipeline::transcribe::run(&ctx, &video_id).await.unwrap();
        vcore_worker::pipeline::scenes::run(&ctx, &video_id).await.unwrap();
    }

    assert_eq!(storage.scenes_for_video(&video_id).await.unwrap().len(), 1);
    assert_eq!(storage.segments_for_video(&video_id).await.unwrap().len(), 2);

    // "Restart": run the full pipeline again over the same storage/fs.
    let ctx = build_context(storage.clone(), scenes, utterances, None, HashMap::new(), tmp.path());
    let outcome = run_pipeline(&ctx, &job_id(), &video_id).await;
    assert!(matches!(outcome, PipelineOutcome::Done));

    // No duplicates: still exactly one scene, two segments, one frame.
    assert_eq!(storage.scenes_for_video(&video_id).await.unwrap().len(), 1);
    assert_eq!(storage.segments_for_video(&video_id).await.unwrap().len(), 2);
    assert_eq!(storage.frames_for_video(&video_id).await.unwrap().len(), 1);
    assert_eq!(
        storage.videos.lock().unwrap().get("vid-1").unwrap().status,
        VideoStatus::Ready
    );
}

/// §8 scenario 6: one of three frames fails vision captioning
/// persistently; the stage skips it with a warning and the job still
/// completes, and embeddings only cover the two captions that exist.
#[tokio::test]
async fn vision_failure_on_one_frame_does_not_fail_the_job() {
    let tmp = TempDir::new().unwrap();
    let video_id = VideoId::from_string("vid-1");
    let video = Video::new(video_id.clone(), "uploads/vid-1_clip.mp4");
    let storage = Arc::new(FakeStorage::with_video(video));

    // Three scenes -> three candidate frames, all with distinct hashes so
    // none are deduped.
    let scenes = vec![(0.0, 4.0), (4.0, 8.0), (8.0, 12.0)];
    let ctx = build_context(
        storage.clone(),
        scenes,
        vec![(0.0, 12.0, "narration".to_string())],
        Some("scene_001".to_string()),
        HashMap::new(),
        tmp.path(),
    );

    let outcome = run_pipeline(&ctx, &job_id(), &video_id).await;
    assert!(matches!(outcome, PipelineOutcome::Done));

    let frames = storage.frames_for_video(&video_id).await.unwrap();
    assert_eq!(frames.len(), 3);

    let captions = storage.captions.lock().unwrap().clone();
    assert_eq!(captions.len(), 2);
    assert!(captions.iter().all(|c| c.embedding.is_some()));
}

/// Fails the first `fail_count` calls immediately (a run of persistent
/// per-frame captioning failures), then succeeds for every later call
/// after a real, non-trivial pause — long enough that concurrently
/// dispatched calls would overlap if the stage were still sending more
/// than one frame at a time.
struct FlakyThenSlowVisionCaptioner {
    fail_count: usize,
    calls_so_far: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FlakyThenSlowVisionCaptioner {
    fn new(fail_count: usize) -> Self {
        Self {
            fail_count,
            calls_so_far: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VisionCaptioner for FlakyThenSlowVisionCaptioner {
    async fn caption(&self, _image_path: &Path) -> MediaResult<VisionCaption> {
        let call_idx = self.calls_so_far.fetch_add(1, Ordering::SeqCst);
        if call_idx < self.fail_count {
            return Err(MediaError::InvalidResponse("persistent failure".into()));
        }

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(VisionCaption {
            caption: "screen".to_string(),
            controls: vec![],
            text_on_screen: vec![],
        })
    }
}

/// §4.D.5: a run of consecutive per-frame captioning failures must trip
/// the sequential-dispatch fallback — the first batch (sized to
/// `vision_max_concurrent`) fails every frame it contains, and every
/// later batch should then process exactly one frame at a time for the
/// rest of the stage, never two frames concurrently.
#[tokio::test]
async fn vision_falls_back_to_sequential_dispatch_after_consecutive_failures() {
    let tmp = TempDir::new().unwrap();
    let video_id = VideoId::from_string("vid-1");
    let video = Video::new(video_id.clone(), "uploads/vid-1_clip.mp4");
    let storage = Arc::new(FakeStorage::with_video(video));

    // 8 scenes -> 8 candidate frames, all with distinct hashes so none are
    // deduped. `vision_max_concurrent` is 5 in `test_config`, so the first
    // batch is 5 frames; all 5 are made to fail, tripping the fallback
    // before any of the remaining 3 frames are dispatched.
    let scenes: Vec<(f64, f64)> = (0..8).map(|i| (i as f64 * 2.0, (i + 1) as f64 * 2.0)).collect();
    let captioner = Arc::new(FlakyThenSlowVisionCaptioner::new(5));

    let ctx = PipelineContext {
        storage: storage.clone(),
        transcoder: Arc::new(FakeTranscoder),
        scene_detector: Arc::new(FakeSceneDetector { scenes }),
        frame_extractor: Arc::new(FakeFrameExtractor),
        hasher: Arc::new(FakeHasher { collisions: HashMap::new() }),
        transcriber: Arc::new(FakeTranscriber {
            utterances: vec![(0.0, 16.0, "narration".to_string())],
        }),
        vision_captioner: captioner.clone(),
        embedder: Arc::new(FakeEmbedder),
        config: test_config(tmp.path()),
    };

    let outcome = run_pipeline(&ctx, &job_id(), &video_id).await;
    assert!(matches!(outcome, PipelineOutcome::Done));

    let captions = storage.captions.lock().unwrap().clone();
    assert_eq!(captions.len(), 3);
    assert!(captions.iter().all(|c| c.embedding.is_some()));
    assert_eq!(
        captioner.max_in_flight.load(Ordering::SeqCst),
        1,
        "stage must dispatch one frame at a time once the fallback has tripped"
    );
}

/// A `Stage` that always fails, standing in for whichever stage a test
/// wants to replace via `PipelineOrchestrator::builder().replace_stage`.
struct AlwaysFailStage {
    name: &'static str,
    milestone: Milestone,
}

#[async_trait]
impl Stage for AlwaysFailStage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn milestone(&self) -> Milestone {
        self.milestone
    }

    async fn run(&self, _ctx: &PipelineContext, _job_id: &JobId, _video_id: &VideoId) -> WorkerResult<()> {
        Err(WorkerError::fatal_input("forced failure from a substituted stage"))
    }
}

/// §4.E: `PipelineOrchestrator` is built so a single stage can be swapped
/// for a test double without rebuilding the rest of the sequence — here
/// the vision stage is replaced with one that always fails, and the
/// stages before it (normalize/transcribe/scenes/frames) must still have
/// run and persisted their rows before the orchestrator stops.
#[tokio::test]
async fn orchestrator_builder_substitutes_a_single_stage_independently_of_the_others() {
    let tmp = TempDir::new().unwrap();
    let video_id = VideoId::from_string("vid-1");
    let video = Video::new(video_id.clone(), "uploads/vid-1_clip.mp4");
    let storage = Arc::new(FakeStorage::with_video(video));

    let ctx = build_context(
        storage.clone(),
        vec![(0.0, 12.0)],
        vec![(0.0, 6.0, "hello".to_string())],
        None,
        HashMap::new(),
        tmp.path(),
    );

    let orchestrator = PipelineOrchestrator::builder()
        .replace_stage(
            "vision",
            Arc::new(AlwaysFailStage { name: "vision", milestone: Milestone::Vision }),
        )
        .build();

    let outcome = orchestrator.run(&ctx, &job_id(), &video_id).await;
    assert!(matches!(outcome, PipelineOutcome::Fatal(_)));

    // normalize/transcribe/scenes/frames ran and persisted before the
    // substituted stage stopped the sequence; embeddings never ran.
    assert_eq!(storage.scenes_for_video(&video_id).await.unwrap().len(), 1);
    assert_eq!(storage.frames_for_video(&video_id).await.unwrap().len(), 1);
    let segments = storage.segments_for_video(&video_id).await.unwrap();
    assert_eq!(segments.len(), 1);
    assert!(segments.iter().all(|s| s.embedding.is_none()));
}
