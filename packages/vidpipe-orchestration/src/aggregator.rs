use crate::error::Result;
use crate::models::{Platform, ProcessingResult, VideoMetadata};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Aggregator statistics snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorStats {
    pub total_results: usize,
    pub cache_size: usize,
    pub storage_dir: PathBuf,
    pub results_by_platform: HashMap<String, usize>,
    pub total_processing_time: f64,
}

/// Collects terminal pipeline results, keeps an in-memory index and
/// persists each result as `<task_id>.json` under `storage_dir`. The files
/// are authoritative; the index is a read-through cache over them.
pub struct ResultAggregator {
    storage_dir: PathBuf,
    cache: DashMap<String, ProcessingResult>,
}

impl ResultAggregator {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage_dir = storage_dir.into();
        std::fs::create_dir_all(&storage_dir)?;
        info!(storage_dir = %storage_dir.display(), "result aggregator initialized");
        Ok(Self {
            storage_dir,
            cache: DashMap::new(),
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn path_for(&self, task_id: &str) -> PathBuf {
        self.storage_dir.join(format!("{}.json", task_id))
    }

    /// Assemble a `ProcessingResult` stamped with the current time and
    /// place it in the in-memory index.
    #[allow(clippy::too_many_arguments)]
    pub fn aggregate(
        &self,
        task_id: &str,
        video_metadata: VideoMetadata,
        video_path: String,
        audio_path: String,
        transcript: String,
        summary: String,
        processing_time: f64,
    ) -> ProcessingResult {
        let result = ProcessingResult {
            task_id: task_id.to_string(),
            video_metadata,
            video_path,
            audio_path,
            transcript,
            summary,
            processing_time,
            created_at: Utc::now(),
        };

        self.cache.insert(task_id.to_string(), result.clone());
        info!(task_id, "result aggregated");
        result
    }

    /// Serialize `result` to its JSON file. Returns the file path.
    pub fn save(&self, result: &ProcessingResult) -> Result<PathBuf> {
        let path = self.path_for(&result.task_id);
        let json = serde_json::to_string_pretty(result)?;
        std::fs::write(&path, json).map_err(|e| {
            error!(task_id = %result.task_id, "failed to save result: {}", e);
            e
        })?;

        self.cache
            .insert(result.task_id.clone(), result.clone());
        info!(task_id = %result.task_id, path = %path.display(), "result saved");
        Ok(path)
    }

    /// Look a result up in the index, falling back to its file. Missing
    /// results are `None`.
    pub fn retrieve(&self, task_id: &str) -> Option<ProcessingResult> {
        if let Some(result) = self.cache.get(task_id) {
            debug!(task_id, "result retrieved from index");
            return Some(result.clone());
        }

        let path = self.path_for(task_id);
        if !path.exists() {
            warn!(task_id, "result file not found");
            return None;
        }

        match self.read_result(&path) {
            Ok(result) => {
                self.cache.insert(task_id.to_string(), result.clone());
                info!(task_id, "result retrieved from file");
                Some(result)
            }
            Err(e) => {
                error!(task_id, "failed to retrieve result: {}", e);
                None
            }
        }
    }

    /// Dictionary form of a result, or `None` when it does not exist.
    pub fn query(&self, task_id: &str) -> Option<serde_json::Value> {
        let result = self.retrieve(task_id)?;
        serde_json::to_value(&result).ok()
    }

    fn read_result(&self, path: &Path) -> Result<ProcessingResult> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Scan every JSON file in the storage directory, applying `keep` to
    /// the raw value and the decoded result. Unreadable files are skipped
    /// with a warning, never aborting the scan.
    fn scan<F>(&self, mut keep: F) -> Vec<ProcessingResult>
    where
        F: FnMut(&serde_json::Value, &ProcessingResult) -> bool,
    {
        let mut results = Vec::new();

        let entries = match std::fs::read_dir(&self.storage_dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(
                    storage_dir = %self.storage_dir.display(),
                    "failed to scan storage dir: {}", e
                );
                return results;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            let parsed = std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|content| {
                    Ok(serde_json::from_str::<serde_json::Value>(&content)?)
                })
                .and_then(|value| {
                    let result: ProcessingResult = serde_json::from_value(value.clone())?;
                    Ok((value, result))
                });

            match parsed {
                Ok((value, result)) => {
                    if keep(&value, &result) {
                        results.push(result);
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), "skipping unreadable result file: {}", e);
                }
            }
        }

        results
    }

    pub fn filter_by_date(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<ProcessingResult> {
        let results = self.scan(|_, result| {
            start <= result.created_at && result.created_at <= end
        });
        info!(count = results.len(), "filtered results by date");
        results
    }

    pub fn filter_by_source(&self, platform: Platform) -> Vec<ProcessingResult> {
        let results = self.scan(|_, result| {
            result.video_metadata.platform == Some(platform)
        });
        info!(count = results.len(), platform = %platform, "filtered results by source");
        results
    }

    /// Match on the optional `"status"` field external collaborators may
    /// write into result files.
    pub fn filter_by_status(&self, status: &str) -> Vec<ProcessingResult> {
        let results = self.scan(|value, _| {
            value.get("status").and_then(|s| s.as_str()) == Some(status)
        });
        info!(count = results.len(), status, "filtered results by status");
        results
    }

    pub fn list_all(&self) -> Vec<ProcessingResult> {
        let results = self.scan(|_, _| true);
        debug!(count = results.len(), "listed all results");
        results
    }

    /// Remove a result from the index and delete its file.
    pub fn delete(&self, task_id: &str) -> bool {
        self.cache.remove(task_id);

        let path = self.path_for(task_id);
        if !path.exists() {
            warn!(task_id, "result file not found");
            return false;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(task_id, "result deleted");
                true
            }
            Err(e) => {
                error!(task_id, "failed to delete result: {}", e);
                false
            }
        }
    }

    /// Wipe the index and every result file.
    pub fn clear_all(&self) -> bool {
        self.cache.clear();

        let entries = match std::fs::read_dir(&self.storage_dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!("failed to clear results: {}", e);
                return false;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), "failed to delete file: {}", e);
                }
            }
        }

        info!("all results cleared");
        true
    }

    pub fn get_stats(&self) -> AggregatorStats {
        let all = self.list_all();
        let mut results_by_platform: HashMap<String, usize> = HashMap::new();
        let mut total_processing_time = 0.0;

        for result in &all {
            let platform = result
                .video_metadata
                .platform
                .unwrap_or(Platform::Unknown)
                .as_str()
                .to_string();
            *results_by_platform.entry(platform).or_insert(0) += 1;
            total_processing_time += result.processing_time;
        }

        AggregatorStats {
            total_results: all.len(),
            cache_size: self.cache.len(),
            storage_dir: self.storage_dir.clone(),
            results_by_platform,
            total_processing_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> (tempfile::TempDir, ResultAggregator) {
        let dir = tempfile::tempdir().unwrap();
        let aggregator = ResultAggregator::new(dir.path()).unwrap();
        (dir, aggregator)
    }

    fn sample(aggregator: &ResultAggregator, task_id: &str, url: &str) -> ProcessingResult {
        aggregator.aggregate(
            task_id,
            VideoMetadata::from_url(url),
            format!("/v/{}.mp4", task_id),
            format!("/a/{}.mp3", task_id),
            "hello world".to_string(),
            "hi".to_string(),
            1.5,
        )
    }

    #[test]
    fn test_save_then_retrieve_cold_cache_roundtrip() {
        let (dir, aggregator) = aggregator();
        let result = sample(&aggregator, "t1", "https://youtu.be/abc");
        aggregator.save(&result).unwrap();

        // Fresh aggregator over the same directory: cold in-memory index.
        let cold = ResultAggregator::new(dir.path()).unwrap();
        let retrieved = cold.retrieve("t1").unwrap();
        assert_eq!(retrieved, result);

        // A second retrieve is served from the now-warm index.
        assert_eq!(cold.retrieve("t1").unwrap(), result);
    }

    #[test]
    fn test_retrieve_missing_is_none() {
        let (_dir, aggregator) = aggregator();
        assert!(aggregator.retrieve("missing").is_none());
        assert!(aggregator.query("missing").is_none());
    }

    #[test]
    fn test_query_dictionary_form() {
        let (_dir, aggregator) = aggregator();
        let result = sample(&aggregator, "t1", "https://youtu.be/abc");
        aggregator.save(&result).unwrap();

        let value = aggregator.query("t1").unwrap();
        assert_eq!(value["task_id"], "t1");
        assert_eq!(value["summary"], "hi");
        assert_eq!(value["video_metadata"]["platform"], "youtube");
    }

    #[test]
    fn test_saved_json_is_two_space_indented() {
        let (_dir, aggregator) = aggregator();
        let result = sample(&aggregator, "t1", "https://youtu.be/abc");
        let path = aggregator.save(&result).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("\n  \"task_id\""));
    }

    #[test]
    fn test_filter_by_source() {
        let (_dir, aggregator) = aggregator();
        for (task_id, url) in [
            ("y1", "https://youtu.be/a"),
            ("y2", "https://www.youtube.com/watch?v=b"),
            ("b1", "https://www.bilibili.com/video/c"),
        ] {
            let result = sample(&aggregator, task_id, url);
            aggregator.save(&result).unwrap();
        }

        assert_eq!(aggregator.filter_by_source(Platform::Youtube).len(), 2);
        assert_eq!(aggregator.filter_by_source(Platform::Bilibili).len(), 1);
        assert_eq!(aggregator.filter_by_source(Platform::Unknown).len(), 0);
    }

    #[test]
    fn test_filter_by_date() {
        let (_dir, aggregator) = aggregator();
        let result = sample(&aggregator, "t1", "https://youtu.be/abc");
        aggregator.save(&result).unwrap();

        let hour = chrono::Duration::hours(1);
        let now = Utc::now();
        assert_eq!(aggregator.filter_by_date(now - hour, now + hour).len(), 1);
        assert_eq!(
            aggregator
                .filter_by_date(now - hour - hour, now - hour)
                .len(),
            0
        );
    }

    #[test]
    fn test_filter_by_status_reads_raw_field() {
        let (dir, aggregator) = aggregator();
        let result = sample(&aggregator, "t1", "https://youtu.be/abc");
        aggregator.save(&result).unwrap();

        // Simulate an external collaborator stamping a status field.
        let path = dir.path().join("t1.json");
        let mut value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        value["status"] = serde_json::json!("completed");
        std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();

        assert_eq!(aggregator.filter_by_status("completed").len(), 1);
        assert_eq!(aggregator.filter_by_status("failed").len(), 0);
    }

    #[test]
    fn test_scan_skips_unreadable_files() {
        let (dir, aggregator) = aggregator();
        let result = sample(&aggregator, "t1", "https://youtu.be/abc");
        aggregator.save(&result).unwrap();
        std::fs::write(dir.path().join("garbage.json"), "not json").unwrap();

        let all = aggregator.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].task_id, "t1");
    }

    #[test]
    fn test_delete() {
        let (_dir, aggregator) = aggregator();
        let result = sample(&aggregator, "t1", "https://youtu.be/abc");
        aggregator.save(&result).unwrap();

        assert!(aggregator.delete("t1"));
        assert!(!aggregator.delete("t1"));
        assert!(aggregator.retrieve("t1").is_none());
    }

    #[test]
    fn test_clear_all() {
        let (_dir, aggregator) = aggregator();
        for task_id in ["t1", "t2"] {
            let result = sample(&aggregator, task_id, "https://youtu.be/abc");
            aggregator.save(&result).unwrap();
        }

        assert!(aggregator.clear_all());
        assert!(aggregator.list_all().is_empty());
        assert_eq!(aggregator.get_stats().cache_size, 0);
    }

    #[test]
    fn test_stats() {
        let (_dir, aggregator) = aggregator();
        for (task_id, url) in [
            ("y1", "https://youtu.be/a"),
            ("b1", "https://b23.tv/c"),
        ] {
            let result = sample(&aggregator, task_id, url);
            aggregator.save(&result).unwrap();
        }

        let stats = aggregator.get_stats();
        assert_eq!(stats.total_results, 2);
        assert_eq!(stats.cache_size, 2);
        assert_eq!(stats.results_by_platform.get("youtube"), Some(&1));
        assert_eq!(stats.results_by_platform.get("bilibili"), Some(&1));
        assert!((stats.total_processing_time - 3.0).abs() < f64::EPSILON);
    }
}
