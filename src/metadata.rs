//! Video catalog persistence.
//!
//! All structs in this module mirror how records are stored in SQLite and
//! exposed to the API. The store also implements [`DuplicateCatalog`] so the
//! duplicate detector can run straight against it.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Builder, Connection, Row, params, params_from_iter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::duplicates::{DuplicateCatalog, DuplicateCheck};
use crate::similarity::normalize_title;

/// SQLite database file relative to the data root.
pub const METADATA_DB_FILE: &str = "metadata.db";

// Column order must match `row_to_video_record`.
const VIDEO_COLUMNS: &str = r#"
    id, title, title_normalized, description, duration_seconds,
    file_hash, file_code, status, is_duplicate, duplicate_of,
    duplicate_reasons_json, created_at
"#;

/// Visibility lifecycle of a video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    #[default]
    Public,
    Private,
    Unlisted,
    Processing,
}

impl VideoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Unlisted => "unlisted",
            Self::Processing => "processing",
        }
    }
}

impl FromStr for VideoStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "unlisted" => Ok(Self::Unlisted),
            "processing" => Ok(Self::Processing),
            other => Err(anyhow!("unknown video status: {other}")),
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal that caused a record to be flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateReason {
    Title,
    Duration,
    File,
}

impl DuplicateReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DuplicateReason::Title => "title",
            DuplicateReason::Duration => "duration",
            DuplicateReason::File => "file",
        }
    }
}

/// Rows stored in the `videos` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: String,
    pub title: String,
    pub title_normalized: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Zero means unknown.
    #[serde(default)]
    pub duration_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_code: Option<String>,
    pub status: VideoStatus,
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicate_reasons: Vec<DuplicateReason>,
    pub created_at: String,
}

/// Upload metadata accepted by [`MetadataStore::insert_video`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVideo {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub file_hash: Option<String>,
    #[serde(default)]
    pub file_code: Option<String>,
    #[serde(default)]
    pub status: Option<VideoStatus>,
    /// Mostly useful for imports; new uploads take the current time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            title_normalized TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            duration_seconds INTEGER NOT NULL DEFAULT 0,
            file_hash TEXT,
            file_code TEXT,
            status TEXT NOT NULL DEFAULT 'public',
            is_duplicate INTEGER NOT NULL DEFAULT 0,
            duplicate_of TEXT,
            duplicate_reasons_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_videos_title_normalized ON videos(title_normalized);
        CREATE INDEX IF NOT EXISTS idx_videos_duration ON videos(duration_seconds);
        CREATE INDEX IF NOT EXISTS idx_videos_file_hash ON videos(file_hash);
        CREATE INDEX IF NOT EXISTS idx_videos_file_code ON videos(file_code);
        CREATE INDEX IF NOT EXISTS idx_videos_is_duplicate ON videos(is_duplicate);
        "#,
    )
    .await?;
    Ok(())
}

/// Wrapper around the SQLite-compatible connection that performs read/write operations.
#[derive(Debug)]
pub struct MetadataStore {
    conn: Connection,
}

impl MetadataStore {
    /// Opens (and if necessary creates) the SQLite DB and ensures the expected
    /// schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating metadata directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening metadata DB {}", path.display()))?;

        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    /// Persists a new upload. When `check` reports a duplicate the record is
    /// stored flagged and private.
    pub async fn insert_video(
        &self,
        video: &NewVideo,
        check: Option<&DuplicateCheck>,
    ) -> Result<VideoRecord> {
        let flagged = check.filter(|check| check.is_duplicate);
        let status = if flagged.is_some() {
            VideoStatus::Private
        } else {
            video.status.unwrap_or_default()
        };
        let record = VideoRecord {
            id: video
                .id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            title: video.title.clone(),
            title_normalized: normalize_title(&video.title),
            description: video.description.clone(),
            duration_seconds: video.duration_seconds.unwrap_or(0).max(0),
            file_hash: non_blank(video.file_hash.as_deref()),
            file_code: non_blank(video.file_code.as_deref()),
            status,
            is_duplicate: flagged.is_some(),
            duplicate_of: flagged.and_then(|check| check.duplicate_of.clone()),
            duplicate_reasons: flagged
                .map(|check| check.reasons.clone())
                .unwrap_or_default(),
            created_at: format_timestamp(video.created_at.unwrap_or_else(Utc::now)),
        };

        let reasons_json = serde_json::to_string(&record.duplicate_reasons)
            .context("serializing duplicate reasons")?;
        self.conn
            .execute(
                r#"
                INSERT INTO videos (
                    id, title, title_normalized, description, duration_seconds,
                    file_hash, file_code, status, is_duplicate, duplicate_of,
                    duplicate_reasons_json, created_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12
                )
                "#,
                params![
                    record.id.as_str(),
                    record.title.as_str(),
                    record.title_normalized.as_str(),
                    record.description.as_str(),
                    record.duration_seconds,
                    record.file_hash.as_deref(),
                    record.file_code.as_deref(),
                    record.status.as_str(),
                    record.is_duplicate as i64,
                    record.duplicate_of.as_deref(),
                    reasons_json,
                    record.created_at.as_str(),
                ],
            )
            .await
            .with_context(|| format!("inserting video {}", record.id))?;

        Ok(record)
    }

    pub async fn get_video(&self, id: &str) -> Result<Option<VideoRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?1"),
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_video_record(&row)?)),
            None => Ok(None),
        }
    }

    /// Every record, newest upload first.
    pub async fn list_videos(&self) -> Result<Vec<VideoRecord>> {
        self.fetch_many(
            &format!("SELECT {VIDEO_COLUMNS} FROM videos ORDER BY created_at DESC, rowid DESC"),
            params![],
        )
        .await
    }

    /// Flagged records waiting for review, newest first.
    pub async fn list_duplicates(&self) -> Result<Vec<VideoRecord>> {
        self.fetch_many(
            &format!(
                r#"
                SELECT {VIDEO_COLUMNS} FROM videos
                WHERE is_duplicate = 1
                ORDER BY created_at DESC, rowid DESC
                "#
            ),
            params![],
        )
        .await
    }

    /// Clears the duplicate flag but leaves the status alone.
    pub async fn keep_video(&self, id: &str) -> Result<Option<VideoRecord>> {
        let updated = self
            .conn
            .execute(
                r#"
                UPDATE videos
                SET is_duplicate = 0, duplicate_of = NULL, duplicate_reasons_json = '[]'
                WHERE id = ?1
                "#,
                params![id],
            )
            .await
            .with_context(|| format!("clearing duplicate flag on {id}"))?;
        if updated == 0 {
            return Ok(None);
        }
        self.get_video(id).await
    }

    /// Clears the duplicate flag and publishes the record.
    pub async fn make_public(&self, id: &str) -> Result<Option<VideoRecord>> {
        let updated = self
            .conn
            .execute(
                r#"
                UPDATE videos
                SET is_duplicate = 0, duplicate_of = NULL, duplicate_reasons_json = '[]',
                    status = 'public'
                WHERE id = ?1
                "#,
                params![id],
            )
            .await
            .with_context(|| format!("publishing {id}"))?;
        if updated == 0 {
            return Ok(None);
        }
        self.get_video(id).await
    }

    /// Deletes flagged records: all of them, or only `ids` when given.
    /// Ids that are not flagged are left untouched. Returns the number of
    /// rows removed.
    pub async fn delete_duplicates(&self, ids: Option<&[String]>) -> Result<u64> {
        let Some(ids) = ids else {
            return self
                .conn
                .execute("DELETE FROM videos WHERE is_duplicate = 1", params![])
                .await
                .context("deleting flagged videos");
        };

        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = (1..=ids.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.conn
            .execute(
                &format!(
                    "DELETE FROM videos WHERE is_duplicate = 1 AND id IN ({placeholders})"
                ),
                params_from_iter(ids.iter().cloned()),
            )
            .await
            .with_context(|| format!("deleting {} flagged video(s)", ids.len()))
    }

    async fn fetch_many(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<VideoRecord>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_video_record(&row)?);
        }
        Ok(records)
    }

    async fn fetch_one(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Option<VideoRecord>> {
        let mut rows = self.conn.query(sql, params).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_video_record(&row)?)),
            None => Ok(None),
        }
    }
}

impl DuplicateCatalog for MetadataStore {
    async fn find_by_normalized_title(
        &self,
        normalized: &str,
        exclude_id: Option<&str>,
    ) -> Result<Option<VideoRecord>> {
        self.fetch_one(
            &format!(
                r#"
                SELECT {VIDEO_COLUMNS} FROM videos
                WHERE is_duplicate = 0
                  AND title_normalized = ?1
                  AND (?2 IS NULL OR id != ?2)
                ORDER BY created_at ASC, rowid ASC
                LIMIT 1
                "#
            ),
            params![normalized, exclude_id],
        )
        .await
    }

    async fn sample_titles(
        &self,
        limit: usize,
        exclude_id: Option<&str>,
    ) -> Result<Vec<VideoRecord>> {
        self.fetch_many(
            &format!(
                r#"
                SELECT {VIDEO_COLUMNS} FROM videos
                WHERE is_duplicate = 0
                  AND title_normalized != ''
                  AND (?1 IS NULL OR id != ?1)
                LIMIT ?2
                "#
            ),
            params![exclude_id, limit as i64],
        )
        .await
    }

    async fn find_in_duration_window(
        &self,
        min: i64,
        max: i64,
        limit: usize,
        exclude_id: Option<&str>,
    ) -> Result<Vec<VideoRecord>> {
        self.fetch_many(
            &format!(
                r#"
                SELECT {VIDEO_COLUMNS} FROM videos
                WHERE is_duplicate = 0
                  AND duration_seconds > 0
                  AND duration_seconds BETWEEN ?1 AND ?2
                  AND (?3 IS NULL OR id != ?3)
                LIMIT ?4
                "#
            ),
            params![min, max, exclude_id, limit as i64],
        )
        .await
    }

    async fn find_by_file_hash(
        &self,
        hash: &str,
        exclude_id: Option<&str>,
    ) -> Result<Option<VideoRecord>> {
        self.fetch_one(
            &format!(
                r#"
                SELECT {VIDEO_COLUMNS} FROM videos
                WHERE is_duplicate = 0
                  AND file_hash = ?1
                  AND (?2 IS NULL OR id != ?2)
                ORDER BY created_at ASC, rowid ASC
                LIMIT 1
                "#
            ),
            params![hash, exclude_id],
        )
        .await
    }

    async fn find_by_file_code(
        &self,
        code: &str,
        exclude_id: Option<&str>,
    ) -> Result<Option<VideoRecord>> {
        // Prefer an original over an already flagged copy.
        self.fetch_one(
            &format!(
                r#"
                SELECT {VIDEO_COLUMNS} FROM videos
                WHERE file_code = ?1
                  AND (?2 IS NULL OR id != ?2)
                ORDER BY is_duplicate ASC, created_at ASC, rowid ASC
                LIMIT 1
                "#
            ),
            params![code, exclude_id],
        )
        .await
    }

    async fn list_originals_oldest_first(&self) -> Result<Vec<VideoRecord>> {
        self.fetch_many(
            &format!(
                r#"
                SELECT {VIDEO_COLUMNS} FROM videos
                WHERE is_duplicate = 0
                ORDER BY created_at ASC, rowid ASC
                "#
            ),
            params![],
        )
        .await
    }

    async fn mark_duplicate(
        &self,
        id: &str,
        original_id: &str,
        reasons: &[DuplicateReason],
    ) -> Result<()> {
        let reasons_json =
            serde_json::to_string(reasons).context("serializing duplicate reasons")?;
        // Records already pointing at `id` move to `original_id` in the same
        // statement so no chain is left behind.
        self.conn
            .execute(
                r#"
                UPDATE videos
                SET duplicate_of = ?2,
                    is_duplicate = CASE WHEN id = ?1 THEN 1 ELSE is_duplicate END,
                    duplicate_reasons_json =
                        CASE WHEN id = ?1 THEN ?3 ELSE duplicate_reasons_json END,
                    status = CASE WHEN id = ?1 THEN 'private' ELSE status END
                WHERE id = ?1 OR duplicate_of = ?1
                "#,
                params![id, original_id, reasons_json],
            )
            .await
            .with_context(|| format!("flagging {id} as duplicate of {original_id}"))?;
        Ok(())
    }
}

/// Converts a SQL row into a `VideoRecord`, decoding the status text, the
/// integer flag and the JSON reasons list.
fn row_to_video_record(row: &Row) -> Result<VideoRecord> {
    let status: String = row.get(7)?;
    let reasons_json: String = row.get(10)?;
    let duplicate_reasons: Vec<DuplicateReason> =
        serde_json::from_str(&reasons_json).context("parsing stored duplicate reasons")?;

    Ok(VideoRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        title_normalized: row.get(2)?,
        description: row.get(3)?,
        duration_seconds: row.get(4)?,
        file_hash: row.get(5)?,
        file_code: row.get(6)?,
        status: status.parse()?,
        is_duplicate: row.get::<i64>(8).map(|value| value != 0)?,
        duplicate_of: row.get(9)?,
        duplicate_reasons,
        created_at: row.get(11)?,
    })
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}
