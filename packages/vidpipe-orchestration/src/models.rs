use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Video hosting platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Bilibili,
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Bilibili => "bilibili",
            Platform::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "youtube" => Ok(Platform::Youtube),
            "bilibili" => Ok(Platform::Bilibili),
            "unknown" => Ok(Platform::Unknown),
            _ => Err(PipelineError::InvalidInput(format!(
                "Invalid platform: {}",
                s
            ))),
        }
    }

    /// Detect the hosting platform from a video URL.
    ///
    /// Unsupported hosts are a download error: the pipeline cannot fetch
    /// from them, so detection is the first thing the download stage does.
    pub fn detect(url: &str) -> Result<Self> {
        if url.contains("youtube.com") || url.contains("youtu.be") {
            Ok(Platform::Youtube)
        } else if url.contains("bilibili.com") || url.contains("b23.tv") {
            Ok(Platform::Bilibili)
        } else {
            Err(PipelineError::Download(format!(
                "Unsupported platform: {}",
                url
            )))
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata describing a source video. Populated once per pipeline, on a
/// best-effort basis; only the URL is guaranteed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub url: String,
    pub title: Option<String>,
    /// Duration in seconds.
    pub duration: Option<u64>,
    pub platform: Option<Platform>,
    pub upload_date: Option<String>,
    pub channel: Option<String>,
}

impl VideoMetadata {
    /// Metadata carrying only the URL (probe unavailable or failed).
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let platform = Platform::detect(&url).ok();
        Self {
            url,
            title: None,
            duration: None,
            platform,
            upload_date: None,
            channel: None,
        }
    }
}

/// Terminal artifact of one pipeline run. Persisted as `<task_id>.json`
/// by the result aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub task_id: String,
    pub video_metadata: VideoMetadata,
    pub video_path: String,
    pub audio_path: String,
    pub transcript: String,
    pub summary: String,
    /// Wall-clock seconds spent in the pipeline.
    pub processing_time: f64,
    pub created_at: DateTime<Utc>,
}

/// Reduced projection of a result for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSummary {
    pub task_id: String,
    pub video_url: String,
    pub video_title: Option<String>,
    pub transcript_length: usize,
    pub summary_length: usize,
    pub processing_time: f64,
    pub created_at: DateTime<Utc>,
}

impl ProcessingResult {
    pub fn summary_view(&self) -> ResultSummary {
        ResultSummary {
            task_id: self.task_id.clone(),
            video_url: self.video_metadata.url.clone(),
            video_title: self.video_metadata.title.clone(),
            transcript_length: self.transcript.len(),
            summary_length: self.summary.len(),
            processing_time: self.processing_time,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_roundtrip() {
        for platform in &[Platform::Youtube, Platform::Bilibili, Platform::Unknown] {
            let s = platform.as_str();
            let parsed = Platform::from_str(s).unwrap();
            assert_eq!(*platform, parsed);
        }
    }

    #[test]
    fn test_platform_detection() {
        assert_eq!(
            Platform::detect("https://www.youtube.com/watch?v=abc").unwrap(),
            Platform::Youtube
        );
        assert_eq!(
            Platform::detect("https://youtu.be/abc").unwrap(),
            Platform::Youtube
        );
        assert_eq!(
            Platform::detect("https://www.bilibili.com/video/BV1").unwrap(),
            Platform::Bilibili
        );
        assert_eq!(
            Platform::detect("https://b23.tv/xyz").unwrap(),
            Platform::Bilibili
        );
    }

    #[test]
    fn test_platform_detection_rejects_unknown_host() {
        let err = Platform::detect("https://vimeo.com/12345").unwrap_err();
        assert!(matches!(err, PipelineError::Download(_)));
    }

    #[test]
    fn test_metadata_from_url_sets_platform() {
        let meta = VideoMetadata::from_url("https://youtu.be/abc");
        assert_eq!(meta.platform, Some(Platform::Youtube));
        assert!(meta.title.is_none());

        let meta = VideoMetadata::from_url("https://example.com/v");
        assert!(meta.platform.is_none());
    }

    #[test]
    fn test_result_json_shape() {
        let result = ProcessingResult {
            task_id: "t1".to_string(),
            video_metadata: VideoMetadata::from_url("https://youtu.be/abc"),
            video_path: "/v/abc.mp4".to_string(),
            audio_path: "/a/abc.mp3".to_string(),
            transcript: "hello world".to_string(),
            summary: "hi".to_string(),
            processing_time: 1.5,
            created_at: Utc::now(),
        };

        let value: serde_json::Value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["task_id"], "t1");
        assert_eq!(value["video_metadata"]["platform"], "youtube");
        assert!(value["video_metadata"]["duration"].is_null());
        assert!(value["created_at"].is_string());

        let back: ProcessingResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_summary_view() {
        let result = ProcessingResult {
            task_id: "t1".to_string(),
            video_metadata: VideoMetadata::from_url("https://youtu.be/abc"),
            video_path: "/v/abc.mp4".to_string(),
            audio_path: "/a/abc.mp3".to_string(),
            transcript: "hello world".to_string(),
            summary: "hi".to_string(),
            processing_time: 1.5,
            created_at: Utc::now(),
        };

        let view = result.summary_view();
        assert_eq!(view.transcript_length, 11);
        assert_eq!(view.summary_length, 2);
        assert_eq!(view.video_url, "https://youtu.be/abc");
    }
}
