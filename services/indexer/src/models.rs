//! Wire models for the indexer REST API.
//!
//! Only the fields this client reads are modelled; everything else in the
//! responses is ignored. Missing fields fall back to their defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Video privacy mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoPrivacy {
    #[default]
    Private,
    Public,
}

impl VideoPrivacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoPrivacy::Private => "Private",
            VideoPrivacy::Public => "Public",
        }
    }
}

/// Insight type a text search is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Transcript,
    Topics,
    Ocr,
    Annotations,
    Brands,
    NamedLocations,
    NamedPeople,
}

impl SearchScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchScope::Transcript => "Transcript",
            SearchScope::Topics => "Topics",
            SearchScope::Ocr => "Ocr",
            SearchScope::Annotations => "Annotations",
            SearchScope::Brands => "Brands",
            SearchScope::NamedLocations => "NamedLocations",
            SearchScope::NamedPeople => "NamedPeople",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionsFormat {
    Vtt,
    Ttml,
    Srt,
    Txt,
    Csv,
}

impl CaptionsFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionsFormat::Vtt => "Vtt",
            CaptionsFormat::Ttml => "Ttml",
            CaptionsFormat::Srt => "Srt",
            CaptionsFormat::Txt => "Txt",
            CaptionsFormat::Csv => "Csv",
        }
    }
}

/// Summary of one video in the account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoInfo {
    pub account_id: String,
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub last_indexed: Option<DateTime<Utc>>,
    pub privacy_mode: String,
    pub user_name: String,
    pub is_owned: bool,
    pub is_base: bool,
    pub has_source_video_file: bool,
    /// Processing state ("Uploaded", "Processing", "Processed", "Failed")
    pub state: String,
    pub moderation_state: Option<String>,
    pub review_state: Option<String>,
    pub duration_in_seconds: u64,
    pub thumbnail_video_id: Option<String>,
    pub thumbnail_id: Option<String>,
    pub indexing_preset: Option<String>,
    pub streaming_preset: Option<String>,
    pub source_language: Option<String>,
    pub source_languages: Vec<String>,
    pub person_model_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NextPage {
    pub page_size: u32,
    pub skip: u32,
    pub done: bool,
}

/// One page of videos, from listing or search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoList {
    pub results: Vec<VideoInfo>,
    pub next_page: NextPage,
}

/// Full insights document of a video
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoIndex {
    pub account_id: String,
    pub id: String,
    pub name: String,
    pub state: String,
    pub privacy_mode: String,
    pub is_editable: bool,
    pub duration_in_seconds: f64,
    pub summarized_insights: SummarizedInsights,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummarizedInsights {
    pub name: String,
    pub id: String,
    pub thumbnail_video_id: Option<String>,
    pub thumbnail_id: Option<String>,
    pub keywords: Vec<KeywordInsight>,
}

/// A keyword with the time ranges it appears in
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeywordInsight {
    pub id: i64,
    pub name: String,
    pub is_transcript: bool,
    pub appearances: Vec<Appearance>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Appearance {
    pub start_time: String,
    pub end_time: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamingUrl {
    pub url: String,
    pub jwt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonModel {
    pub id: Uuid,
    pub name: String,
    pub is_default: bool,
    pub persons_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Person {
    pub id: Uuid,
    pub name: String,
    pub sample_face: Option<CustomFace>,
    pub last_modified: Option<DateTime<Utc>>,
    pub last_modifier_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Persons {
    pub results: Vec<Person>,
    pub page_size: u32,
    pub skip: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomFace {
    pub id: Uuid,
    pub state: String,
    pub source_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomFaces {
    pub total_count: u32,
    pub results: Vec<CustomFace>,
    pub page_size: u32,
    pub skip: u32,
}

/// Body of a custom face enrollment request
#[derive(Debug, Clone, Serialize)]
pub struct CreateCustomFacesRequest<'a> {
    pub urls: &'a [String],
}

/// Face detections per frame, from the Faces artifact
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FacesArtifact {
    pub version: f64,
    pub timescale: f64,
    pub offset: f64,
    pub framerate: f64,
    pub width: f64,
    pub height: f64,
    pub total_duration: f64,
    pub fragments: Vec<FaceFragment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FaceFragment {
    pub start: f64,
    pub duration: f64,
    pub interval: f64,
    pub events: Vec<Vec<FaceEvent>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FaceEvent {
    pub index: f64,
    pub id: i64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub is_deputy: bool,
    pub detection_confidence: f64,
}

/// Free-form metadata attached to an uploaded video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VideoMetadataAttribute {
    pub name: String,
    pub value: String,
}

/// Parameters for indexing a video
#[derive(Debug, Clone)]
pub struct UploadVideoRequest {
    /// Where the indexer fetches the video from; unused for byte uploads
    pub video_url: String,
    pub name: String,
    pub description: String,
    pub file_name: String,
    pub privacy: VideoPrivacy,
    pub callback_url: Option<String>,
    pub person_model_id: Option<Uuid>,
    /// Source language, "auto" to detect
    pub language: String,
    pub indexing_preset: String,
    pub metadata: Vec<VideoMetadataAttribute>,
}

impl UploadVideoRequest {
    pub fn new(video_url: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            video_url: video_url.into(),
            file_name: name.clone(),
            name,
            description: String::new(),
            privacy: VideoPrivacy::Private,
            callback_url: None,
            person_model_id: None,
            language: "auto".to_string(),
            indexing_preset: "Default".to_string(),
            metadata: Vec::new(),
        }
    }

    /// Request for a video whose bytes are sent with the upload
    pub fn for_file(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    pub videos_ranges: Vec<VideoRange>,
}

/// Slice of a source video used in a project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRange {
    pub video_id: String,
    pub range: TimeRange,
}

/// `hh:mm:ss` bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub account_id: String,
    pub id: String,
    pub name: String,
    pub state: String,
    pub created: Option<DateTime<Utc>>,
    pub duration_in_seconds: u64,
    pub indexing_preset: Option<String>,
}
