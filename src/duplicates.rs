#![forbid(unsafe_code)]

//! Duplicate detection for uploaded videos.
//!
//! Two entry points live here:
//!
//! * [`DuplicateDetector::check`] classifies a single upload against the
//!   catalog. It never fails: store errors are logged and the candidate is
//!   reported as unique so uploads keep flowing.
//! * [`DuplicateDetector::scan`] compares every non-duplicate record against
//!   every later one and flags the later record of each matching pair.
//!
//! Both talk to storage through [`DuplicateCatalog`], which the libsql-backed
//! [`MetadataStore`](crate::metadata::MetadataStore) implements.

use std::collections::HashSet;
use std::future::Future;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metadata::{DuplicateReason, VideoRecord};
use crate::similarity::{normalize_title, similarity};

pub const DEFAULT_TITLE_SCAN_LIMIT: usize = 1000;
pub const DEFAULT_DURATION_SCAN_LIMIT: usize = 50;
pub const DEFAULT_DURATION_TOLERANCE_SECS: i64 = 2;
pub const DEFAULT_TITLE_THRESHOLD: f64 = 0.85;
pub const DEFAULT_DURATION_TITLE_THRESHOLD: f64 = 0.50;
pub const DEFAULT_MIN_TITLE_LEN: usize = 5;

/// Knobs that trade recall against per-request cost.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorLimits {
    /// Upper bound on records pulled for the fuzzy title pass.
    pub title_scan_limit: usize,
    /// Upper bound on records pulled for the duration window.
    pub duration_scan_limit: usize,
    /// Inclusive +/- window, in seconds.
    pub duration_tolerance_secs: i64,
    pub title_threshold: f64,
    /// Looser than `title_threshold` because a duration hit already
    /// corroborates the match.
    pub duration_title_threshold: f64,
    /// Normalized titles shorter than this are ignored by title matching.
    pub min_title_len: usize,
}

impl Default for DetectorLimits {
    fn default() -> Self {
        Self {
            title_scan_limit: DEFAULT_TITLE_SCAN_LIMIT,
            duration_scan_limit: DEFAULT_DURATION_SCAN_LIMIT,
            duration_tolerance_secs: DEFAULT_DURATION_TOLERANCE_SECS,
            title_threshold: DEFAULT_TITLE_THRESHOLD,
            duration_title_threshold: DEFAULT_DURATION_TITLE_THRESHOLD,
            min_title_len: DEFAULT_MIN_TITLE_LEN,
        }
    }
}

/// Storage queries the detector needs.
///
/// Unless stated otherwise, lookups only return records that are not
/// themselves flagged as duplicates, and skip `exclude_id` when it is set so
/// an already persisted upload never matches itself.
pub trait DuplicateCatalog: Sync {
    /// Exact match on the stored normalized title.
    fn find_by_normalized_title(
        &self,
        normalized: &str,
        exclude_id: Option<&str>,
    ) -> impl Future<Output = Result<Option<VideoRecord>>> + Send;

    /// Up to `limit` records with a non-empty normalized title, in no
    /// particular order.
    fn sample_titles(
        &self,
        limit: usize,
        exclude_id: Option<&str>,
    ) -> impl Future<Output = Result<Vec<VideoRecord>>> + Send;

    /// Up to `limit` records whose duration lies in `min..=max`.
    fn find_in_duration_window(
        &self,
        min: i64,
        max: i64,
        limit: usize,
        exclude_id: Option<&str>,
    ) -> impl Future<Output = Result<Vec<VideoRecord>>> + Send;

    fn find_by_file_hash(
        &self,
        hash: &str,
        exclude_id: Option<&str>,
    ) -> impl Future<Output = Result<Option<VideoRecord>>> + Send;

    /// Exact provider file code lookup. Unlike the other lookups this one
    /// also returns records already flagged as duplicates.
    fn find_by_file_code(
        &self,
        code: &str,
        exclude_id: Option<&str>,
    ) -> impl Future<Output = Result<Option<VideoRecord>>> + Send;

    /// Every non-duplicate record, earliest upload first.
    fn list_originals_oldest_first(&self) -> impl Future<Output = Result<Vec<VideoRecord>>> + Send;

    /// Flags `id` as a duplicate of `original_id` and forces it private.
    /// Records that already point at `id` are re-pointed at `original_id`
    /// in the same write.
    fn mark_duplicate(
        &self,
        id: &str,
        original_id: &str,
        reasons: &[DuplicateReason],
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Upload metadata submitted for a duplicate check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCandidate {
    pub title: String,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub file_hash: Option<String>,
    #[serde(default)]
    pub file_code: Option<String>,
    /// Id of the candidate itself when it is already stored.
    #[serde(default)]
    pub exclude_id: Option<String>,
}

/// Which check produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchKind {
    Title,
    Duration,
    FileHash,
    FileCode,
}

impl MatchKind {
    pub fn reason(self) -> DuplicateReason {
        match self {
            Self::Title => DuplicateReason::Title,
            Self::Duration => DuplicateReason::Duration,
            Self::FileHash | Self::FileCode => DuplicateReason::File,
        }
    }
}

/// One matching check, kept for audit and for the review UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateMatch {
    pub kind: MatchKind,
    pub reason: DuplicateReason,
    pub video_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    /// Root original the candidate should point at. Differs from `video_id`
    /// only when the matched record is itself a flagged duplicate.
    #[serde(skip)]
    original_id: String,
}

impl DuplicateMatch {
    fn new(kind: MatchKind, record: &VideoRecord, similarity: Option<f64>) -> Self {
        let original_id = if record.is_duplicate {
            record
                .duplicate_of
                .clone()
                .unwrap_or_else(|| record.id.clone())
        } else {
            record.id.clone()
        };
        Self {
            kind,
            reason: kind.reason(),
            video_id: record.id.clone(),
            title: record.title.clone(),
            similarity,
            original_id,
        }
    }
}

/// Outcome of [`DuplicateDetector::check`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    pub reasons: Vec<DuplicateReason>,
    pub matches: Vec<DuplicateMatch>,
}

impl DuplicateCheck {
    fn from_matches(matches: Vec<DuplicateMatch>) -> Self {
        let mut reasons = Vec::new();
        for found in &matches {
            if !reasons.contains(&found.reason) {
                reasons.push(found.reason);
            }
        }
        Self {
            is_duplicate: !matches.is_empty(),
            duplicate_of: matches.first().map(|found| found.original_id.clone()),
            reasons,
            matches,
        }
    }
}

/// Result of a full-catalog scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub duplicates_found: usize,
    pub total_scanned: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateDetector {
    limits: DetectorLimits,
}

impl DuplicateDetector {
    pub fn new(limits: DetectorLimits) -> Self {
        Self { limits }
    }

    /// Runs the title, duration, hash and file-code checks in that order and
    /// collects every hit. The first hit decides `duplicate_of`.
    ///
    /// Store failures are logged and reported as "no duplicate"; callers
    /// must not treat a negative answer as a guarantee.
    pub async fn check<C: DuplicateCatalog>(
        &self,
        catalog: &C,
        candidate: &DuplicateCandidate,
    ) -> DuplicateCheck {
        match self.try_check(catalog, candidate).await {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    title = %candidate.title,
                    "duplicate check failed, treating upload as unique: {err:#}"
                );
                DuplicateCheck::default()
            }
        }
    }

    async fn try_check<C: DuplicateCatalog>(
        &self,
        catalog: &C,
        candidate: &DuplicateCandidate,
    ) -> Result<DuplicateCheck> {
        let exclude_id = candidate.exclude_id.as_deref();
        let normalized = normalize_title(&candidate.title);
        let mut matches = Vec::new();

        if let Some(found) = self.title_match(catalog, &normalized, exclude_id).await? {
            matches.push(found);
        }

        if let Some(found) = self
            .duration_match(catalog, &normalized, candidate.duration_seconds, exclude_id)
            .await?
        {
            matches.push(found);
        }

        if let Some(hash) = non_blank(candidate.file_hash.as_deref()) {
            let record = catalog
                .find_by_file_hash(hash, exclude_id)
                .await
                .context("looking up file hash")?;
            if let Some(record) = record {
                matches.push(DuplicateMatch::new(MatchKind::FileHash, &record, None));
            }
        }

        if let Some(code) = non_blank(candidate.file_code.as_deref()) {
            let record = catalog
                .find_by_file_code(code, exclude_id)
                .await
                .context("looking up file code")?;
            if let Some(record) = record {
                matches.push(DuplicateMatch::new(MatchKind::FileCode, &record, None));
            }
        }

        let result = DuplicateCheck::from_matches(matches);
        if result.is_duplicate {
            debug!(
                title = %candidate.title,
                duplicate_of = ?result.duplicate_of,
                reasons = ?result.reasons,
                "upload matches existing video"
            );
        }
        Ok(result)
    }

    async fn title_match<C: DuplicateCatalog>(
        &self,
        catalog: &C,
        normalized: &str,
        exclude_id: Option<&str>,
    ) -> Result<Option<DuplicateMatch>> {
        if normalized.chars().count() < self.limits.min_title_len {
            return Ok(None);
        }

        let exact = catalog
            .find_by_normalized_title(normalized, exclude_id)
            .await
            .context("looking up normalized title")?;
        if let Some(record) = exact {
            return Ok(Some(DuplicateMatch::new(MatchKind::Title, &record, Some(1.0))));
        }

        let pool = catalog
            .sample_titles(self.limits.title_scan_limit, exclude_id)
            .await
            .context("loading titles for fuzzy match")?;
        Ok(best_title_match(&pool, normalized, self.limits.title_threshold)
            .map(|(record, score)| DuplicateMatch::new(MatchKind::Title, record, Some(score))))
    }

    async fn duration_match<C: DuplicateCatalog>(
        &self,
        catalog: &C,
        normalized: &str,
        duration_seconds: Option<i64>,
        exclude_id: Option<&str>,
    ) -> Result<Option<DuplicateMatch>> {
        let Some(duration) = duration_seconds.filter(|value| *value > 0) else {
            return Ok(None);
        };
        // Duration agreement alone is too common to flag anything.
        if normalized.is_empty() {
            return Ok(None);
        }

        let tolerance = self.limits.duration_tolerance_secs;
        let pool = catalog
            .find_in_duration_window(
                duration.saturating_sub(tolerance),
                duration.saturating_add(tolerance),
                self.limits.duration_scan_limit,
                exclude_id,
            )
            .await
            .context("loading duration window")?;
        Ok(
            best_title_match(&pool, normalized, self.limits.duration_title_threshold).map(
                |(record, score)| DuplicateMatch::new(MatchKind::Duration, record, Some(score)),
            ),
        )
    }

    /// Compares every non-duplicate record with every later one, earliest
    /// upload first, and flags the later record of each matching pair.
    ///
    /// Each flag is written as soon as it is found. A store error aborts the
    /// scan and leaves earlier flags in place; running the scan again picks
    /// up where the catalog now stands.
    pub async fn scan<C: DuplicateCatalog>(&self, catalog: &C) -> Result<ScanReport> {
        let records = catalog
            .list_originals_oldest_first()
            .await
            .context("loading catalog for duplicate scan")?;
        info!(total = records.len(), "starting duplicate scan");

        let mut flagged: HashSet<&str> = HashSet::new();
        for (index, original) in records.iter().enumerate() {
            if flagged.contains(original.id.as_str()) {
                continue;
            }
            for later in &records[index + 1..] {
                if flagged.contains(later.id.as_str()) {
                    continue;
                }
                let reasons = self.pair_reasons(original, later);
                if reasons.is_empty() {
                    continue;
                }
                catalog
                    .mark_duplicate(&later.id, &original.id, &reasons)
                    .await
                    .with_context(|| format!("flagging {} as duplicate of {}", later.id, original.id))?;
                debug!(
                    duplicate = %later.id,
                    original = %original.id,
                    ?reasons,
                    "flagged duplicate"
                );
                flagged.insert(later.id.as_str());
            }
        }

        let report = ScanReport {
            duplicates_found: flagged.len(),
            total_scanned: records.len(),
        };
        info!(
            duplicates_found = report.duplicates_found,
            total_scanned = report.total_scanned,
            "duplicate scan finished"
        );
        Ok(report)
    }

    fn pair_reasons(&self, original: &VideoRecord, later: &VideoRecord) -> Vec<DuplicateReason> {
        let limits = &self.limits;
        let mut reasons = Vec::new();

        let a = original.title_normalized.as_str();
        let b = later.title_normalized.as_str();
        if a.chars().count() >= limits.min_title_len
            && b.chars().count() >= limits.min_title_len
            && similarity(a, b) >= limits.title_threshold
        {
            reasons.push(DuplicateReason::Title);
        }

        if original.duration_seconds > 0
            && later.duration_seconds > 0
            && (original.duration_seconds - later.duration_seconds).abs()
                <= limits.duration_tolerance_secs
        {
            reasons.push(DuplicateReason::Duration);
        }

        if let (Some(a), Some(b)) = (
            non_blank(original.file_hash.as_deref()),
            non_blank(later.file_hash.as_deref()),
        ) && a == b
        {
            reasons.push(DuplicateReason::File);
        }

        reasons
    }
}

/// Highest-scoring record at or above `threshold`; ties keep the earlier one.
fn best_title_match<'a>(
    pool: &'a [VideoRecord],
    normalized: &str,
    threshold: f64,
) -> Option<(&'a VideoRecord, f64)> {
    let mut best: Option<(&VideoRecord, f64)> = None;
    for record in pool {
        let score = similarity(normalized, &record.title_normalized);
        if score < threshold {
            continue;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((record, score)),
        }
    }
    best
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
