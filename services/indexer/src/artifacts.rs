//! Artifact bundle collection.
//!
//! For every [`ArtifactKind`], in registry order, the collector resolves a
//! signed download url, fetches the payload and writes it as one deflated zip
//! entry. A kind that fails at any step is logged and recorded as skipped;
//! the rest of the batch carries on. Only archive-level failures (finishing
//! the writer, rewinding the sink) abort the whole operation.

use crate::error::{IndexerError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Seek, SeekFrom, Write};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Analysis artifact produced by the indexer for a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    Ocr,
    Faces,
    FacesThumbnails,
    VisualContentModeration,
    KeyframesThumbnails,
    LanguageDetection,
    Metadata,
    Emotions,
    TextualContentModeration,
}

/// How an artifact payload is packaged by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packaging {
    /// A zip of images
    Archive,
    /// A JSON document
    Json,
}

impl Packaging {
    pub fn extension(&self) -> &'static str {
        match self {
            Packaging::Archive => "zip",
            Packaging::Json => "json",
        }
    }
}

impl ArtifactKind {
    /// Every kind, in collection order
    pub const ALL: [ArtifactKind; 9] = [
        ArtifactKind::Ocr,
        ArtifactKind::Faces,
        ArtifactKind::FacesThumbnails,
        ArtifactKind::VisualContentModeration,
        ArtifactKind::KeyframesThumbnails,
        ArtifactKind::LanguageDetection,
        ArtifactKind::Metadata,
        ArtifactKind::Emotions,
        ArtifactKind::TextualContentModeration,
    ];

    /// Name used by the remote `type` parameter and for bundle entries
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Ocr => "Ocr",
            ArtifactKind::Faces => "Faces",
            ArtifactKind::FacesThumbnails => "FacesThumbnails",
            ArtifactKind::VisualContentModeration => "VisualContentModeration",
            ArtifactKind::KeyframesThumbnails => "KeyframesThumbnails",
            ArtifactKind::LanguageDetection => "LanguageDetection",
            ArtifactKind::Metadata => "Metadata",
            ArtifactKind::Emotions => "Emotions",
            ArtifactKind::TextualContentModeration => "TextualContentModeration",
        }
    }

    /// Thumbnail collections arrive as archives, everything else as JSON
    pub fn packaging(&self) -> Packaging {
        match self {
            ArtifactKind::FacesThumbnails | ArtifactKind::KeyframesThumbnails => Packaging::Archive,
            _ => Packaging::Json,
        }
    }

    /// Bundle entry name, `{Kind}.{ext}`
    pub fn entry_name(&self) -> String {
        format!("{}.{}", self.as_str(), self.packaging().extension())
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where artifact locations and payloads come from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Resolve the signed download url for one artifact of a video
    async fn artifact_url(
        &self,
        video_id: &str,
        kind: ArtifactKind,
        cancel: &CancellationToken,
    ) -> Result<String>;

    /// Fetch the full payload behind a signed url
    async fn fetch_payload(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>>;
}

/// Result of collecting one artifact kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// Payload fetched and written to the bundle
    Retrieved {
        kind: ArtifactKind,
        entry_name: String,
        size_bytes: usize,
    },
    /// Kind left out of the bundle
    Skipped { kind: ArtifactKind, reason: String },
}

impl ArtifactOutcome {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactOutcome::Retrieved { kind, .. } | ArtifactOutcome::Skipped { kind, .. } => *kind,
        }
    }

    pub fn is_retrieved(&self) -> bool {
        matches!(self, ArtifactOutcome::Retrieved { .. })
    }
}

/// What ended up in a bundle
#[derive(Debug, Clone)]
pub struct BundleReport {
    pub video_id: String,
    /// One outcome per kind attempted, in registry order
    pub outcomes: Vec<ArtifactOutcome>,
}

impl BundleReport {
    /// Entry names written to the archive, in order
    pub fn entry_names(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                ArtifactOutcome::Retrieved { entry_name, .. } => Some(entry_name.as_str()),
                ArtifactOutcome::Skipped { .. } => None,
            })
            .collect()
    }

    pub fn retrieved_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_retrieved()).count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ArtifactOutcome> {
        self.outcomes.iter().filter(|o| !o.is_retrieved())
    }
}

/// Collects every artifact of a video into a zip bundle
pub struct ArtifactCollector<S> {
    source: S,
}

impl<S: ArtifactSource> ArtifactCollector<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Write all obtainable artifacts of `video_id` into `sink` as a zip and
    /// rewind the sink to its start.
    ///
    /// On cancellation no further kinds are fetched; the archive is still
    /// finished so the entries already written stay readable, and
    /// [`IndexerError::Cancelled`] is returned.
    #[instrument(skip(self, sink, cancel))]
    pub async fn collect<W: Write + Seek>(
        &self,
        video_id: &str,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> Result<BundleReport> {
        let mut writer = ZipWriter::new(&mut *sink);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut outcomes = Vec::with_capacity(ArtifactKind::ALL.len());
        let mut cancelled = false;

        for kind in ArtifactKind::ALL {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let outcome = match self.fetch(video_id, kind, cancel).await {
                Ok(payload) => match write_entry(&mut writer, kind, &payload, options) {
                    Ok(entry_name) => ArtifactOutcome::Retrieved {
                        kind,
                        entry_name,
                        size_bytes: payload.len(),
                    },
                    Err(e) => ArtifactOutcome::Skipped {
                        kind,
                        reason: e.to_string(),
                    },
                },
                Err(IndexerError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => ArtifactOutcome::Skipped {
                    kind,
                    reason: e.to_string(),
                },
            };

            match &outcome {
                ArtifactOutcome::Retrieved { size_bytes, .. } => {
                    metrics::counter!("indexer.artifacts.retrieved").increment(1);
                    debug!(kind = %kind, size_bytes = size_bytes, "Artifact added to bundle");
                }
                ArtifactOutcome::Skipped { reason, .. } => {
                    metrics::counter!("indexer.artifacts.skipped").increment(1);
                    warn!(
                        kind = %kind,
                        video_id = %video_id,
                        reason = %reason,
                        "Skipping artifact"
                    );
                }
            }

            outcomes.push(outcome);
        }

        let sink = writer.finish()?;
        sink.seek(SeekFrom::Start(0))
            .map_err(|e| IndexerError::Archive(format!("Failed to rewind bundle sink: {}", e)))?;

        if cancelled {
            info!(written = outcomes.iter().filter(|o| o.is_retrieved()).count(), "Artifact collection cancelled");
            return Err(IndexerError::Cancelled);
        }

        let report = BundleReport {
            video_id: video_id.to_string(),
            outcomes,
        };

        info!(
            retrieved = report.retrieved_count(),
            skipped = report.outcomes.len() - report.retrieved_count(),
            "Artifact bundle complete"
        );

        Ok(report)
    }

    async fn fetch(
        &self,
        video_id: &str,
        kind: ArtifactKind,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let url = self.source.artifact_url(video_id, kind, cancel).await?;
        self.source.fetch_payload(&url, cancel).await
    }
}

/// Write one complete entry. A failed write aborts the entry so the archive
/// never holds a partial one.
fn write_entry<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    kind: ArtifactKind,
    payload: &[u8],
    options: SimpleFileOptions,
) -> Result<String> {
    let entry_name = kind.entry_name();
    // Without the zip64 flag the writer aborts oversized entries on its own
    let options = options.large_file(payload.len() as u64 >= u64::from(u32::MAX));
    writer.start_file(entry_name.as_str(), options)?;

    // Flushing pushes the compressed stream out now, so a failing sink
    // surfaces on this entry rather than when the next one starts.
    if let Err(e) = writer.write_all(payload).and_then(|()| writer.flush()) {
        if let Err(abort_err) = writer.abort_file() {
            warn!(kind = %kind, error = %abort_err, "Failed to abort partial bundle entry");
        }
        return Err(IndexerError::Archive(format!(
            "Failed to write {}: {}",
            entry_name, e
        )));
    }

    Ok(entry_name)
}
