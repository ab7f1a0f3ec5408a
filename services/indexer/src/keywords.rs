//! Keyword aggregation across videos.
//!
//! [`KeywordAggregator::scan`] walks the videos in the given order and yields
//! one [`KeywordEvent`] per keyword entry, flagging the first time each text
//! is seen in the scan. [`KeywordAggregator::aggregate`] folds those events
//! into a [`KeywordTally`]. Keyword texts are compared exactly; no case or
//! whitespace normalization is applied.

use crate::error::{IndexerError, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::{pin_mut, Stream, StreamExt};
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// A keyword and how many times it appears in one video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordCount {
    pub text: String,
    pub appearances: u64,
}

impl KeywordCount {
    pub fn new(text: impl Into<String>, appearances: u64) -> Self {
        Self {
            text: text.into(),
            appearances,
        }
    }
}

/// Per-video keyword listings
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeywordSource: Send + Sync {
    async fn keyword_listing(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<KeywordCount>>;
}

/// One keyword entry observed during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordEvent {
    pub video_id: String,
    pub text: String,
    pub appearances: u64,
    /// True only the first time this text is seen in the scan
    pub first_seen: bool,
}

/// Cumulative keyword counts, iterated in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordTally {
    counts: HashMap<String, u64>,
    order: Vec<String>,
}

impl KeywordTally {
    /// Add appearances for a keyword; returns true if the keyword is new
    pub fn record(&mut self, text: &str, appearances: u64) -> bool {
        match self.counts.get_mut(text) {
            Some(count) => {
                *count += appearances;
                false
            }
            None => {
                self.counts.insert(text.to_string(), appearances);
                self.order.push(text.to_string());
                true
            }
        }
    }

    pub fn count(&self, text: &str) -> Option<u64> {
        self.counts.get(text).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Keywords with their counts, in the order they were first seen
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.order
            .iter()
            .map(move |text| (text.as_str(), self.counts[text]))
    }

    pub fn into_counts(self) -> HashMap<String, u64> {
        self.counts
    }
}

/// Folds keyword listings of many videos into one tally
pub struct KeywordAggregator<S> {
    source: S,
}

impl<S: KeywordSource> KeywordAggregator<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Lazy, finite stream of keyword events for the given videos.
    ///
    /// Cancellation is checked before each video and before each keyword
    /// entry; a cancelled scan ends with [`IndexerError::Cancelled`]. The
    /// first failing listing ends the stream with that error.
    pub fn scan<'a>(
        &'a self,
        video_ids: &'a [String],
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = Result<KeywordEvent>> + 'a {
        try_stream! {
            let mut seen: HashSet<String> = HashSet::new();

            for video_id in video_ids {
                check_cancelled(cancel)?;

                let listing = self.source.keyword_listing(video_id, cancel).await?;
                debug!(video_id = %video_id, keywords = listing.len(), "Fetched keyword listing");

                for entry in listing {
                    check_cancelled(cancel)?;

                    let first_seen = seen.insert(entry.text.clone());
                    yield KeywordEvent {
                        video_id: video_id.clone(),
                        text: entry.text,
                        appearances: entry.appearances,
                        first_seen,
                    };
                }
            }
        }
    }

    /// Tally keywords across the given videos
    pub async fn aggregate(
        &self,
        video_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<KeywordTally> {
        self.aggregate_with(video_ids, |_| {}, cancel).await
    }

    /// Tally keywords, calling `on_new_keyword` once per distinct text as it
    /// is first seen
    #[instrument(skip(self, video_ids, on_new_keyword, cancel), fields(videos = video_ids.len()))]
    pub async fn aggregate_with<F>(
        &self,
        video_ids: &[String],
        mut on_new_keyword: F,
        cancel: &CancellationToken,
    ) -> Result<KeywordTally>
    where
        F: FnMut(&str),
    {
        let events = self.scan(video_ids, cancel);
        pin_mut!(events);

        let mut tally = KeywordTally::default();
        while let Some(event) = events.next().await {
            let event = event?;
            tally.record(&event.text, event.appearances);
            if event.first_seen {
                on_new_keyword(&event.text);
            }
        }

        info!(distinct = tally.len(), "Keyword scan complete");
        Ok(tally)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(IndexerError::Cancelled)
    } else {
        Ok(())
    }
}
