//! The storage gateway: the `JobSource` and `Storage` capability
//! interfaces (§9) backed by a pooled `sqlx::PgPool`.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use vcore_models::{
    CaptionEntities, Frame, FrameCaption, JobId, JobStatus, Scene, TranscriptSegment, Video,
    VideoId, VideoStatus,
};

use crate::error::{StorageError, StorageResult};

/// Truncated to keep error text from growing the `jobs.error` column
/// without bound across repeated retries.
const MAX_ERROR_LEN: usize = 2000;

fn truncate_error(message: &str) -> String {
    if message.len() <= MAX_ERROR_LEN {
        message.to_string()
    } else {
        // `message[..MAX_ERROR_LEN]` would panic if that byte offset lands
        // inside a multi-byte character (routine for OpenAI/ffmpeg error
        // text); walk char boundaries instead.
        let boundary = message
            .char_indices()
            .take_while(|(i, _)| *i < MAX_ERROR_LEN)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}... (truncated)", &message[..boundary])
    }
}

fn video_status_from_str(s: &str) -> VideoStatus {
    match s {
        "uploaded" => VideoStatus::Uploaded,
        "processing" => VideoStatus::Processing,
        "ready" => VideoStatus::Ready,
        _ => VideoStatus::Failed,
    }
}

fn job_status_from_str(s: &str) -> JobStatus {
    match s {
        "pending" => JobStatus::Pending,
        "processing" => JobStatus::Processing,
        "done" => JobStatus::Done,
        _ => JobStatus::Failed,
    }
}

/// A job claimed for processing: the two IDs the job controller hands to
/// the pipeline orchestrator, plus the attempt count it just incremented.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job_id: JobId,
    pub video_id: VideoId,
    pub attempts: u32,
}

/// One row of the `/jobs/peek` projection.
#[derive(Debug, Clone)]
pub struct QueuePeekRow {
    pub job_id: JobId,
    pub video_id: VideoId,
    pub status: JobStatus,
    pub attempts: u32,
}

/// Counters behind the `/stats` projection.
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub done: i64,
    pub failed: i64,
}

/// `claim/complete/fail/reset/peek` over the job queue (§9's `JobSource`
/// capability).
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn claim_next_job(&self) -> StorageResult<Option<ClaimedJob>>;
    async fn complete_job(&self, job_id: &JobId) -> StorageResult<()>;
    async fn fail_job(&self, job_id: &JobId, message: &str) -> StorageResult<()>;
    async fn reset_job(&self, job_id: &JobId, message: &str) -> StorageResult<()>;
    async fn peek_queue(&self, limit: i64) -> StorageResult<Vec<QueuePeekRow>>;
    async fn stats(&self) -> StorageResult<QueueStats>;
}

/// The §4.B storage operations the pipeline stages read and write
/// through.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn fetch_video(&self, video_id: &VideoId) -> StorageResult<Video>;
    async fn update_video_normalized(
        &self,
        video_id: &VideoId,
        normalized_path: &str,
        duration_sec: f64,
    ) -> StorageResult<()>;
    async fn mark_video_ready(&self, video_id: &VideoId) -> StorageResult<()>;

    async fn scenes_for_video(&self, video_id: &VideoId) -> StorageResult<Vec<Scene>>;
    async fn bulk_insert_scenes(&self, rows: &[Scene]) -> StorageResult<()>;

    async fn segments_for_video(&self, video_id: &VideoId) -> StorageResult<Vec<TranscriptSegment>>;
    async fn bulk_insert_segments(&self, rows: &[TranscriptSegment]) -> StorageResult<()>;
    async fn segments_missing_embedding(
        &self,
        video_id: &VideoId,
    ) -> StorageResult<Vec<TranscriptSegment>>;
    async fn update_segment_embedding(&self, id: &str, vector: &[f32]) -> StorageResult<()>;

    async fn frames_for_video(&self, video_id: &VideoId) -> StorageResult<Vec<Frame>>;
    async fn bulk_insert_frames(&self, rows: &[Frame]) -> StorageResult<()>;
    async fn frames_missing_caption(&self, video_id: &VideoId) -> StorageResult<Vec<Frame>>;

    async fn bulk_insert_captions(&self, rows: &[FrameCaption]) -> StorageResult<()>;
    async fn captions_missing_embedding(
        &self,
        video_id: &VideoId,
    ) -> StorageResult<Vec<FrameCaption>>;
    async fn update_caption_embedding(&self, id: &str, vector: &[f32]) -> StorageResult<()>;
}

/// The relational implementation of both capability interfaces, over one
/// pooled connection.
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobSource for PgStorage {
    async fn claim_next_job(&self) -> StorageResult<Option<ClaimedJob>> {
        let row = sqlx::query(
            r#"
            WITH claimed AS (
                SELECT id
                FROM jobs
                WHERE status = 'pending'
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs j
            SET status = 'processing',
                attempts = j.attempts + 1,
                locked_at = now()
            FROM claimed
            WHERE j.id = claimed.id
            RETURNING j.id, j.video_id, j.attempts
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ClaimedJob {
            job_id: JobId::from_string(r.get::<String, _>("id")),
            video_id: VideoId::from_string(r.get::<String, _>("video_id")),
            attempts: r.get::<i32, _>("attempts") as u32,
        }))
    }

    async fn complete_job(&self, job_id: &JobId) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE jobs SET status = 'done', locked_at = NULL WHERE id = $1")
            .bind(job_id.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE videos SET status = 'ready' \
             WHERE id = (SELECT video_id FROM jobs WHERE id = $1)",
        )
        .bind(job_id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn fail_job(&self, job_id: &JobId, message: &str) -> StorageResult<()> {
        sqlx::query("UPDATE jobs SET status = 'failed', error = $2, locked_at = NULL WHERE id = $1")
            .bind(job_id.as_str())
            .bind(truncate_error(message))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_job(&self, job_id: &JobId, message: &str) -> StorageResult<()> {
        // Preserves `attempts`; only the status, lock, and last error move.
        sqlx::query(
            "UPDATE jobs SET status = 'pending', error = $2, locked_at = NULL WHERE id = $1",
        )
        .bind(job_id.as_str())
        .bind(truncate_error(message))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn peek_queue(&self, limit: i64) -> StorageResult<Vec<QueuePeekRow>> {
        let rows = sqlx::query(
            "SELECT id, video_id, status, attempts FROM jobs \
             WHERE status IN ('pending', 'processing') \
             ORDER BY created_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| QueuePeekRow {
                job_id: JobId::from_string(r.get::<String, _>("id")),
                video_id: VideoId::from_string(r.get::<String, _>("video_id")),
                status: job_status_from_str(r.get::<&str, _>("status")),
                attempts: r.get::<i32, _>("attempts") as u32,
            })
            .collect())
    }

    async fn stats(&self) -> StorageResult<QueueStats> {
        let rows = sqlx::query("SELECT status, count(*) AS n FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: &str = row.get("status");
            let n: i64 = row.get("n");
            match status {
                "pending" => stats.pending = n,
                "processing" => stats.processing = n,
                "done" => stats.done = n,
                "failed" => stats.failed = n,
                _ => {}
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn fetch_video(&self, video_id: &VideoId) -> StorageResult<Video> {
        let row = sqlx::query(
            "SELECT id, original_path, status, normalized_path, duration_sec \
             FROM videos WHERE id = $1",
        )
        .bind(video_id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::not_found(format!("video {video_id}")))?;

        Ok(Video {
            id: VideoId::from_string(row.get::<String, _>("id")),
            original_path: row.get("original_path"),
            status: video_status_from_str(row.get::<&str, _>("status")),
            normalized_path: row.get("normalized_path"),
            duration_sec: row.get("duration_sec"),
        })
    }

    async fn update_video_normalized(
        &self,
        video_id: &VideoId,
        normalized_path: &str,
        duration_sec: f64,
    ) -> StorageResult<()> {
        sqlx::query(
            "UPDATE videos SET normalized_path = $2, duration_sec = $3, status = 'processing' \
             WHERE id = $1",
        )
        .bind(video_id.as_str())
        .bind(normalized_path)
        .bind(duration_sec)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_video_ready(&self, video_id: &VideoId) -> StorageResult<()> {
        sqlx::query("UPDATE videos SET status = 'ready' WHERE id = $1")
            .bind(video_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn scenes_for_video(&self, video_id: &VideoId) -> StorageResult<Vec<Scene>> {
        let rows = sqlx::query(
            "SELECT id, video_id, idx, t_start, t_end FROM scenes \
             WHERE video_id = $1 ORDER BY idx ASC",
        )
        .bind(video_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Scene {
                id: r.get("id"),
                video_id: VideoId::from_string(r.get::<String, _>("video_id")),
                idx: r.get::<i32, _>("idx") as u32,
                t_start: r.get("t_start"),
                t_end: r.get("t_end"),
            })
            .collect())
    }

    async fn bulk_insert_scenes(&self, rows: &[Scene]) -> StorageResult<()> {
        for scene in rows {
            sqlx::query(
                "INSERT INTO scenes (id, video_id, idx, t_start, t_end) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (video_id, idx) DO NOTHING",
            )
            .bind(&scene.id)
            .bind(scene.video_id.as_str())
            .bind(scene.idx as i32)
            .bind(scene.t_start)
            .bind(scene.t_end)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn segments_for_video(&self, video_id: &VideoId) -> StorageResult<Vec<TranscriptSegment>> {
        let rows = sqlx::query(
            "SELECT id, video_id, idx, t_start, t_end, text, embedding \
             FROM transcript_segments WHERE video_id = $1 ORDER BY idx ASC",
        )
        .bind(video_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_segment).collect())
    }

    async fn bulk_insert_segments(&self, rows: &[TranscriptSegment]) -> StorageResult<()> {
        for segment in rows {
            sqlx::query(
                "INSERT INTO transcript_segments (id, video_id, idx, t_start, t_end, text) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (video_id, t_start, t_end) DO NOTHING",
            )
            .bind(&segment.id)
            .bind(segment.video_id.as_str())
            .bind(segment.idx as i32)
            .bind(segment.t_start)
            .bind(segment.t_end)
            .bind(&segment.text)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn segments_missing_embedding(
        &self,
        video_id: &VideoId,
    ) -> StorageResult<Vec<TranscriptSegment>> {
        let rows = sqlx::query(
            "SELECT id, video_id, idx, t_start, t_end, text, embedding \
             FROM transcript_segments WHERE video_id = $1 AND embedding IS NULL \
             ORDER BY idx ASC",
        )
        .bind(video_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_segment).collect())
    }

    async fn update_segment_embedding(&self, id: &str, vector: &[f32]) -> StorageResult<()> {
        sqlx::query("UPDATE transcript_segments SET embedding = $2 WHERE id = $1")
            .bind(id)
            .bind(pgvector_literal(vector))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn frames_for_video(&self, video_id: &VideoId) -> StorageResult<Vec<Frame>> {
        let rows = sqlx::query(
            "SELECT id, video_id, scene_id, idx, t_frame, path, phash FROM frames \
             WHERE video_id = $1 ORDER BY idx ASC",
        )
        .bind(video_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_frame).collect())
    }

    async fn bulk_insert_frames(&self, rows: &[Frame]) -> StorageResult<()> {
        for frame in rows {
            sqlx::query(
                "INSERT INTO frames (id, video_id, scene_id, idx, t_frame, path, phash) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(&frame.id)
            .bind(frame.video_id.as_str())
            .bind(&frame.scene_id)
            .bind(frame.idx as i32)
            .bind(frame.t_frame)
            .bind(&frame.path)
            .bind(&frame.phash)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn frames_missing_caption(&self, video_id: &VideoId) -> StorageResult<Vec<Frame>> {
        let rows = sqlx::query(
            "SELECT f.id, f.video_id, f.scene_id, f.idx, f.t_frame, f.path, f.phash \
             FROM frames f \
             LEFT JOIN frame_captions c ON c.frame_id = f.id \
             WHERE f.video_id = $1 AND c.id IS NULL \
             ORDER BY f.idx ASC",
        )
        .bind(video_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_frame).collect())
    }

    async fn bulk_insert_captions(&self, rows: &[FrameCaption]) -> StorageResult<()> {
        for caption in rows {
            let entities = serde_json::to_value(&caption.entities)
                .map_err(|e| StorageError::ConstraintViolation(e.to_string()))?;
            sqlx::query(
                "INSERT INTO frame_captions (id, frame_id, video_id, caption, entities) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(&caption.id)
            .bind(&caption.frame_id)
            .bind(caption.video_id.as_str())
            .bind(&caption.caption)
            .bind(entities)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn captions_missing_embedding(
        &self,
        video_id: &VideoId,
    ) -> StorageResult<Vec<FrameCaption>> {
        let rows = sqlx::query(
            "SELECT id, frame_id, video_id, caption, entities, embedding FROM frame_captions \
             WHERE video_id = $1 AND embedding IS NULL",
        )
        .bind(video_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_caption).collect()
    }

    async fn update_caption_embedding(&self, id: &str, vector: &[f32]) -> StorageResult<()> {
        sqlx::query("UPDATE frame_captions SET embedding = $2 WHERE id = $1")
            .bind(id)
            .bind(pgvector_literal(vector))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_segment(row: sqlx::postgres::PgRow) -> TranscriptSegment {
    TranscriptSegment {
        id: row.get("id"),
        video_id: VideoId::from_string(row.get::<String, _>("video_id")),
        idx: row.get::<i32, _>("idx") as u32,
        t_start: row.get("t_start"),
        t_end: row.get("t_end"),
        text: row.get("text"),
        embedding: None,
    }
}

fn row_to_frame(row: sqlx::postgres::PgRow) -> Frame {
    Frame {
        id: row.get("id"),
        video_id: VideoId::from_string(row.get::<String, _>("video_id")),
        scene_id: row.get("scene_id"),
        idx: row.get::<i32, _>("idx") as u32,
        t_frame: row.get("t_frame"),
        path: row.get("path"),
        phash: row.get("phash"),
    }
}

fn row_to_caption(row: sqlx::postgres::PgRow) -> StorageResult<FrameCaption> {
    let entities_json: serde_json::Value = row.get("entities");
    let entities: CaptionEntities = serde_json::from_value(entities_json)
        .map_err(|e| StorageError::ConstraintViolation(e.to_string()))?;

    Ok(FrameCaption {
        id: row.get("id"),
        frame_id: row.get("frame_id"),
        video_id: VideoId::from_string(row.get::<String, _>("video_id")),
        caption: row.get("caption"),
        entities,
        embedding: None,
    })
}

/// `pgvector`'s text input format: `[0.1,0.2,...]`.
fn pgvector_literal(vector: &[f32]) -> String {
    let mut s = String::with_capacity(vector.len() * 8 + 2);
    s.push('[');
    for (i, v) in vector.iter().enumerate() {
        if i > 0 {
            s.push(',');
        }
        s.push_str(&v.to_string());
    }
    s.push(']');
    s
}
