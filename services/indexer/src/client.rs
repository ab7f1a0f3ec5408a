//! High-level indexer operations.
//!
//! [`IndexerClient`] mints the right token for each call, builds the request
//! url and hands the exchange to the [`Gateway`]. Listing, search, upload and
//! customization calls carry an [`AccountToken`]; anything that reads or
//! changes one video carries a [`ResourceToken`] for that video.

use crate::artifacts::{ArtifactCollector, ArtifactKind, ArtifactSource, BundleReport};
use crate::config::{AccountConfig, Config, HttpConfig};
use crate::error::{IndexerError, Result};
use crate::faces::{FacePreValidator, ImageProbe, RemoteImageProbe};
use crate::gateway::{redact, Gateway};
use crate::keywords::{KeywordAggregator, KeywordCount, KeywordSource, KeywordTally};
use crate::models::{
    CaptionsFormat, CreateCustomFacesRequest, CreateProjectRequest, CustomFaces, FacesArtifact,
    PersonModel, Person, Persons, Project, SearchScope, StreamingUrl, UploadVideoRequest,
    VideoIndex, VideoInfo, VideoList,
};
use crate::token::{AccountToken, Permission, ResourceToken, TokenBroker};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use std::io::{Seek, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

const ACCESS_TOKEN_PARAM: &str = "accessToken";

/// Client for one indexer account
#[derive(Clone)]
pub struct IndexerClient {
    gateway: Arc<Gateway>,
    tokens: TokenBroker,
    probe: Arc<dyn ImageProbe>,
}

impl IndexerClient {
    pub fn new(account: AccountConfig, http: HttpConfig) -> Result<Self> {
        let gateway = Arc::new(Gateway::new(account, &http)?);
        Ok(Self {
            tokens: TokenBroker::new(gateway.clone()),
            gateway,
            probe: Arc::new(RemoteImageProbe::new(&http)?),
        })
    }

    /// Replace the probe used to size face pictures before enrollment
    pub fn with_image_probe<P: ImageProbe + 'static>(mut self, probe: P) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.account.clone(), config.http.clone())
    }

    pub fn tokens(&self) -> &TokenBroker {
        &self.tokens
    }

    // ---------------------------------------------------------------------
    // Videos
    // ---------------------------------------------------------------------

    /// First page of videos in the account
    pub async fn list_videos(&self, cancel: &CancellationToken) -> Result<VideoList> {
        let token = self.tokens.account_token(Permission::Read, cancel).await?;
        let url = self.account_url(&token, &["Videos"], &[])?;
        self.gateway.get_json(url, cancel).await
    }

    /// Free-text search, optionally restricted to some insight types
    pub async fn search_videos(
        &self,
        query: &str,
        scopes: &[SearchScope],
        source_language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<VideoList> {
        let token = self.tokens.account_token(Permission::Read, cancel).await?;

        let mut params = vec![("query", query)];
        params.extend(scopes.iter().map(|s| ("textScope", s.as_str())));
        if let Some(language) = source_language.filter(|l| !l.trim().is_empty()) {
            params.push(("sourceLanguage", language));
        }

        let url = self.account_url(&token, &["Videos", "Search"], &params)?;
        self.gateway.get_json(url, cancel).await
    }

    pub async fn search_videos_by_ids(
        &self,
        video_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<VideoList> {
        let token = self.tokens.account_token(Permission::Read, cancel).await?;
        let params: Vec<_> = video_ids.iter().map(|id| ("id", id.as_str())).collect();
        let url = self.account_url(&token, &["Videos", "Search"], &params)?;
        self.gateway.get_json(url, cancel).await
    }

    pub async fn video_index(&self, video_id: &str, cancel: &CancellationToken) -> Result<VideoIndex> {
        let token = self
            .tokens
            .resource_token(video_id, Permission::Read, cancel)
            .await?;
        let url = self.video_url(&token, &["Index"], &[])?;
        self.gateway.get_json(url, cancel).await
    }

    /// Keywords of one video with their appearance counts. Repeated names are
    /// merged by exact text, keeping first-seen order.
    pub async fn video_keywords(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<KeywordCount>> {
        let index = self.video_index(video_id, cancel).await?;

        let mut merged: Vec<KeywordCount> = Vec::new();
        for keyword in index.summarized_insights.keywords {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }

            let appearances = keyword.appearances.len() as u64;
            match merged.iter_mut().find(|k| k.text == keyword.name) {
                Some(existing) => existing.appearances += appearances,
                None => merged.push(KeywordCount::new(keyword.name, appearances)),
            }
        }

        Ok(merged)
    }

    /// Tally keywords over every video in the account, calling
    /// `on_new_keyword` the first time each keyword is seen
    pub async fn all_keywords<F>(
        &self,
        on_new_keyword: F,
        cancel: &CancellationToken,
    ) -> Result<KeywordTally>
    where
        F: FnMut(&str),
    {
        let videos = self.list_videos(cancel).await?;
        let video_ids: Vec<String> = videos.results.into_iter().map(|v| v.id).collect();

        KeywordAggregator::new(self.clone())
            .aggregate_with(&video_ids, on_new_keyword, cancel)
            .await
    }

    pub async fn delete_video(&self, video_id: &str, cancel: &CancellationToken) -> Result<()> {
        let token = self
            .tokens
            .resource_token(video_id, Permission::Edit, cancel)
            .await?;
        let url = self.video_url(&token, &[], &[])?;
        self.gateway.delete(url, cancel).await?;
        info!(video_id = %video_id, "Deleted video");
        Ok(())
    }

    /// Ask the indexer to fetch and index a video reachable by url
    #[instrument(skip(self, request, cancel), fields(name = %request.name))]
    pub async fn upload_video_from_url(
        &self,
        request: &UploadVideoRequest,
        cancel: &CancellationToken,
    ) -> Result<VideoInfo> {
        if request.video_url.trim().is_empty() {
            return Err(IndexerError::Validation("Video url is required".to_string()));
        }

        let token = self.tokens.account_token(Permission::Edit, cancel).await?;
        let mut params = upload_params(request)?;
        params.push(("videoUrl", request.video_url.clone()));

        let url = self.account_url(&token, &["Videos"], &borrow_params(&params))?;
        let video: VideoInfo = self.gateway.post_json::<(), _>(url, None, cancel).await?;

        info!(video_id = %video.id, state = %video.state, "Video submitted for indexing");
        Ok(video)
    }

    /// Upload the video itself as the `file` part of a multipart form.
    /// `request.video_url` is ignored.
    #[instrument(skip(self, request, bytes, cancel), fields(name = %request.name, size_bytes = bytes.len()))]
    pub async fn upload_video_bytes(
        &self,
        request: &UploadVideoRequest,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<VideoInfo> {
        let token = self.tokens.account_token(Permission::Edit, cancel).await?;
        let params = upload_params(request)?;
        let url = self.account_url(&token, &["Videos"], &borrow_params(&params))?;

        let file = Part::bytes(bytes).file_name(request.file_name.clone());
        let form = Form::new().part("file", file);
        let video: VideoInfo = self.gateway.post_multipart(url, form, cancel).await?;

        info!(video_id = %video.id, state = %video.state, "Video uploaded for indexing");
        Ok(video)
    }

    pub async fn streaming_url(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StreamingUrl> {
        let token = self
            .tokens
            .resource_token(video_id, Permission::Read, cancel)
            .await?;
        let url = self.video_url(&token, &["streaming-url"], &[])?;
        self.gateway.get_json(url, cancel).await
    }

    pub async fn source_file_download_url(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let token = self
            .tokens
            .resource_token(video_id, Permission::Read, cancel)
            .await?;
        let url = self.video_url(&token, &["SourceFile", "DownloadUrl"], &[])?;
        self.gateway.get_quoted(url, cancel).await
    }

    pub async fn captions(
        &self,
        video_id: &str,
        format: CaptionsFormat,
        include_audio_effects: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let token = self
            .tokens
            .resource_token(video_id, Permission::Read, cancel)
            .await?;
        let audio_effects = if include_audio_effects { "true" } else { "false" };
        let url = self.video_url(
            &token,
            &["Captions"],
            &[("format", format.as_str()), ("includeAudioEffects", audio_effects)],
        )?;
        self.gateway.get_bytes(url, cancel).await
    }

    /// Jpeg thumbnail, base64 encoded
    pub async fn thumbnail_base64(
        &self,
        video_id: &str,
        thumbnail_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let token = self
            .tokens
            .resource_token(video_id, Permission::Read, cancel)
            .await?;
        let url = self.video_url(
            &token,
            &["Thumbnails", thumbnail_id],
            &[("format", "Jpeg")],
        )?;
        let bytes = self.gateway.get_bytes(url, cancel).await?;
        Ok(STANDARD.encode(bytes))
    }

    /// Embeddable insights widget html. An edit token yields an editable
    /// widget.
    pub async fn insights_widget(
        &self,
        video_id: &str,
        permission: Permission,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let token = self.tokens.resource_token(video_id, permission, cancel).await?;
        let url = self.video_url(
            &token,
            &["InsightsWidget"],
            &[("allowEdit", permission.allow_edit())],
        )?;
        self.gateway.get_text(url, cancel).await
    }

    pub async fn player_widget(&self, video_id: &str, cancel: &CancellationToken) -> Result<String> {
        let token = self
            .tokens
            .resource_token(video_id, Permission::Read, cancel)
            .await?;
        let url = self.video_url(&token, &["PlayerWidget"], &[])?;
        self.gateway.get_text(url, cancel).await
    }

    // ---------------------------------------------------------------------
    // Artifacts
    // ---------------------------------------------------------------------

    /// Signed download url of one artifact
    pub async fn artifact_download_url(
        &self,
        video_id: &str,
        kind: ArtifactKind,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let token = self
            .tokens
            .resource_token(video_id, Permission::Read, cancel)
            .await?;
        let url = self.video_url(&token, &["ArtifactUrl"], &[("type", kind.as_str())])?;
        self.gateway.get_quoted(url, cancel).await
    }

    /// Face detections per frame
    pub async fn faces_artifact_info(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<FacesArtifact> {
        let location = self
            .artifact_download_url(video_id, ArtifactKind::Faces, cancel)
            .await?;
        let url = self.gateway.url(&location, &[])?;
        self.gateway.get_json(url, cancel).await
    }

    /// Write every obtainable artifact of a video into `sink` as a zip
    pub async fn download_all_artifacts<W: Write + Seek>(
        &self,
        video_id: &str,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> Result<BundleReport> {
        ArtifactCollector::new(self.clone())
            .collect(video_id, sink, cancel)
            .await
    }

    // ---------------------------------------------------------------------
    // Person models and custom faces
    // ---------------------------------------------------------------------

    pub async fn person_models(&self, cancel: &CancellationToken) -> Result<Vec<PersonModel>> {
        let token = self.tokens.account_token(Permission::Read, cancel).await?;
        let url = self.account_url(&token, &["Customization", "PersonModels"], &[])?;
        self.gateway.get_json(url, cancel).await
    }

    /// Person models whose name matches `name` exactly
    pub async fn person_model_by_name(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PersonModel>> {
        let models = self.person_models(cancel).await?;
        Ok(models.into_iter().filter(|m| m.name == name).collect())
    }

    pub async fn create_person_model(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<PersonModel> {
        let token = self.tokens.account_token(Permission::Edit, cancel).await?;
        let url = self.account_url(
            &token,
            &["Customization", "PersonModels"],
            &[("name", name)],
        )?;
        self.gateway.post_json::<(), _>(url, None, cancel).await
    }

    pub async fn persons_in_model(
        &self,
        person_model_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Persons> {
        let token = self.tokens.account_token(Permission::Read, cancel).await?;
        let model = person_model_id.to_string();
        let url = self.account_url(
            &token,
            &["Customization", "PersonModels", model.as_str(), "Persons"],
            &[],
        )?;
        self.gateway.get_json(url, cancel).await
    }

    pub async fn create_person(
        &self,
        person_model_id: Uuid,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Person> {
        let token = self.tokens.account_token(Permission::Edit, cancel).await?;
        let model = person_model_id.to_string();
        let url = self.account_url(
            &token,
            &["Customization", "PersonModels", model.as_str(), "Persons"],
            &[("name", name)],
        )?;
        self.gateway.post_json::<(), _>(url, None, cancel).await
    }

    pub async fn custom_faces(
        &self,
        person_model_id: Uuid,
        person_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<CustomFaces> {
        let token = self.tokens.account_token(Permission::Read, cancel).await?;
        let (model, person) = (person_model_id.to_string(), person_id.to_string());
        let url = self.account_url(&token, &faces_segments(&model, &person), &[])?;
        self.gateway.get_json(url, cancel).await
    }

    pub async fn custom_face_picture(
        &self,
        person_model_id: Uuid,
        person_id: Uuid,
        face_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let token = self.tokens.account_token(Permission::Read, cancel).await?;
        let (model, person, face) = (
            person_model_id.to_string(),
            person_id.to_string(),
            face_id.to_string(),
        );
        let mut segments = faces_segments(&model, &person).to_vec();
        segments.push(face.as_str());
        let url = self.account_url(&token, &segments, &[])?;
        self.gateway.get_bytes(url, cancel).await
    }

    pub async fn custom_faces_sprite(
        &self,
        person_model_id: Uuid,
        person_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let token = self.tokens.account_token(Permission::Read, cancel).await?;
        let (model, person) = (person_model_id.to_string(), person_id.to_string());
        let mut segments = faces_segments(&model, &person).to_vec();
        segments.push("sprite");
        let url = self.account_url(&token, &segments, &[])?;
        self.gateway.get_bytes(url, cancel).await
    }

    /// Enroll pictures as custom faces of a person and return the id of the
    /// first created face. The batch is validated locally before anything is
    /// sent to the indexer.
    #[instrument(skip(self, picture_urls, cancel), fields(count = picture_urls.len()))]
    pub async fn create_custom_faces(
        &self,
        person_model_id: Uuid,
        person_id: Uuid,
        picture_urls: &[Url],
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.face_validator()
            .validate_batch(picture_urls, cancel)
            .await?;

        let token = self.tokens.account_token(Permission::Edit, cancel).await?;
        let (model, person) = (person_model_id.to_string(), person_id.to_string());
        let url = self.account_url(&token, &faces_segments(&model, &person), &[])?;
        let endpoint = redact(&url);

        let urls: Vec<String> = picture_urls.iter().map(|u| u.to_string()).collect();
        let body = CreateCustomFacesRequest { urls: &urls };
        let face_ids: Vec<String> = self.gateway.post_json(url, Some(&body), cancel).await?;

        let face_id = face_ids.into_iter().next().ok_or_else(|| IndexerError::Schema {
            endpoint,
            message: "No face id returned".to_string(),
        })?;

        info!(face_id = %face_id, "Custom faces enrolled");
        Ok(face_id)
    }

    /// Pre-validator that probes pictures without the account credential
    pub fn face_validator(&self) -> FacePreValidator<Arc<dyn ImageProbe>> {
        FacePreValidator::new(self.probe.clone())
    }

    // ---------------------------------------------------------------------
    // Projects
    // ---------------------------------------------------------------------

    pub async fn create_project(
        &self,
        request: &CreateProjectRequest,
        cancel: &CancellationToken,
    ) -> Result<Project> {
        let token = self.tokens.account_token(Permission::Edit, cancel).await?;
        let url = self.account_url(&token, &["Projects"], &[])?;
        self.gateway.post_json(url, Some(request), cancel).await
    }

    pub async fn render_project(&self, project_id: &str, cancel: &CancellationToken) -> Result<()> {
        let token = self.tokens.account_token(Permission::Edit, cancel).await?;
        let url = self.account_url(
            &token,
            &["Projects", project_id, "render"],
            &[("sendCompletionEmail", "true")],
        )?;
        self.gateway.post_empty(url, cancel).await
    }

    // ---------------------------------------------------------------------
    // Url building
    // ---------------------------------------------------------------------

    fn account_url(
        &self,
        token: &AccountToken,
        segments: &[&str],
        params: &[(&str, &str)],
    ) -> Result<Url> {
        let root = self.gateway.account().account_root();
        self.with_token(&root, segments, params, token.value())
    }

    /// `{account}/Videos/{video}/{segments...}` for the token's video
    fn video_url(
        &self,
        token: &ResourceToken,
        segments: &[&str],
        params: &[(&str, &str)],
    ) -> Result<Url> {
        let root = self.gateway.account().account_root();
        let mut path = vec!["Videos", token.video_id()];
        path.extend_from_slice(segments);
        self.with_token(&root, &path, params, token.value())
    }

    fn with_token(
        &self,
        root: &str,
        segments: &[&str],
        params: &[(&str, &str)],
        token: &str,
    ) -> Result<Url> {
        let mut all = params.to_vec();
        all.push((ACCESS_TOKEN_PARAM, token));
        self.gateway.endpoint(root, segments, &all)
    }
}

fn faces_segments<'a>(person_model_id: &'a str, person_id: &'a str) -> [&'a str; 6] {
    [
        "Customization",
        "PersonModels",
        person_model_id,
        "Persons",
        person_id,
        "Faces",
    ]
}

/// Query parameters shared by both upload flavours
fn upload_params(request: &UploadVideoRequest) -> Result<Vec<(&'static str, String)>> {
    let mut params = vec![
        ("name", request.name.clone()),
        ("privacy", request.privacy.as_str().to_string()),
        ("description", request.description.clone()),
    ];
    if !request.metadata.is_empty() {
        let metadata = serde_json::to_string(&request.metadata).map_err(|e| {
            IndexerError::Validation(format!("Unserializable video metadata: {}", e))
        })?;
        params.push(("metadata", metadata));
    }
    if let Some(callback_url) = &request.callback_url {
        params.push(("callbackUrl", callback_url.clone()));
    }
    params.push(("language", request.language.clone()));
    params.push(("fileName", request.file_name.clone()));
    params.push(("indexingPreset", request.indexing_preset.clone()));
    if let Some(person_model_id) = request.person_model_id {
        params.push(("personModelId", person_model_id.to_string()));
    }
    params.push(("sendSuccessEmail", "true".to_string()));
    Ok(params)
}

fn borrow_params<'a>(params: &'a [(&'static str, String)]) -> Vec<(&'static str, &'a str)> {
    params.iter().map(|(k, v)| (*k, v.as_str())).collect()
}

#[async_trait]
impl ArtifactSource for IndexerClient {
    async fn artifact_url(
        &self,
        video_id: &str,
        kind: ArtifactKind,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.artifact_download_url(video_id, kind, cancel).await
    }

    async fn fetch_payload(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let url = self.gateway.url(url, &[])?;
        self.gateway.get_bytes(url, cancel).await
    }
}

#[async_trait]
impl KeywordSource for IndexerClient {
    async fn keyword_listing(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<KeywordCount>> {
        self.video_keywords(video_id, cancel).await
    }
}
