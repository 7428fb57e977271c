//! Incremental extraction of one resource type
//!
//! [`Extractor::extract`] turns a cursor into an [`Extraction`]: a search for
//! everything updated since the cursor's watermark, sorted by `_lastUpdated`.
//! Pages are fetched lazily and in server order; each page request goes through
//! the retry state machine. Iterating again starts a fresh search.

use super::bundle::parse_bundle;
use super::retry::{retry, RetryPolicy};
use crate::adapters::fhir::FhirClient;
use crate::config::FhirConfig;
use crate::core::state::Cursor;
use crate::domain::{ExtractError, Record, ResourceType, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use url::Url;

/// One fetched search page
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based position in the result set
    pub number: usize,
    /// Records on this page in server order
    pub records: Vec<Record>,
    /// Whether the server announced another page
    pub has_next: bool,
}

impl Page {
    /// Highest `meta.lastUpdated` on the page
    pub fn max_last_updated(&self) -> Option<DateTime<Utc>> {
        self.records.iter().filter_map(Record::last_updated).max()
    }
}

/// Fully drained extraction
#[derive(Debug, Clone)]
pub struct ExtractedBatch {
    /// Records in server order
    ///
    /// At most `max_records` of them lie past the starting watermark, plus
    /// any records sharing the `lastUpdated` of the last one counted.
    pub records: Vec<Record>,
    /// Pages fetched
    pub pages: usize,
    /// Candidate watermark: the larger of the cursor's and the highest observed
    pub new_watermark: Option<DateTime<Utc>>,
    /// The record cap cut the result set short
    pub truncated: bool,
}

/// Builds extractions for resource types
#[derive(Debug, Clone)]
pub struct Extractor {
    client: FhirClient,
    policy: RetryPolicy,
    page_size: usize,
    max_records: Option<usize>,
}

impl Extractor {
    /// Create an extractor
    pub fn new(client: FhirClient, policy: RetryPolicy, page_size: usize, max_records: Option<usize>) -> Self {
        Self {
            client,
            policy,
            page_size: page_size.max(1),
            max_records,
        }
    }

    /// Create an extractor from the `[fhir]` section
    pub fn from_config(config: &FhirConfig) -> Result<Self> {
        Ok(Self::new(
            FhirClient::from_config(config)?,
            RetryPolicy::from_config(&config.retry),
            config.page_size,
            config.max_records,
        ))
    }

    /// Underlying client
    pub fn client(&self) -> &FhirClient {
        &self.client
    }

    /// Plan the extraction of `resource_type` since `cursor`'s watermark
    ///
    /// Nothing is fetched until the extraction is iterated.
    pub fn extract(&self, resource_type: &ResourceType, cursor: &Cursor) -> Extraction {
        let since = cursor.last_successful_watermark;
        let mut params = vec![
            ("_sort", "_lastUpdated".to_string()),
            ("_count", self.page_size.to_string()),
        ];
        if let Some(since) = since {
            // `ge` re-reads records at the boundary; row de-duplication absorbs them
            params.push((
                "_lastUpdated",
                format!("ge{}", since.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            ));
        }

        Extraction {
            client: self.client.clone(),
            policy: self.policy.clone(),
            resource_type: resource_type.clone(),
            first_url: self.client.search_url(resource_type, &params),
            since,
            max_records: self.max_records,
        }
    }
}

/// A planned, restartable search for one resource type
#[derive(Debug, Clone)]
pub struct Extraction {
    client: FhirClient,
    policy: RetryPolicy,
    resource_type: ResourceType,
    first_url: Url,
    since: Option<DateTime<Utc>>,
    max_records: Option<usize>,
}

struct PageState {
    client: FhirClient,
    policy: RetryPolicy,
    next: Option<Url>,
    number: usize,
}

impl Extraction {
    /// Resource type being extracted
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    /// URL of the first search page
    pub fn first_url(&self) -> &Url {
        &self.first_url
    }

    /// Watermark the search starts from
    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }

    /// Lazy stream of pages
    ///
    /// Each call starts from the first page again and re-fetches; nothing is
    /// cached. The stream ends after the first error.
    pub fn pages(&self) -> BoxStream<'static, std::result::Result<Page, ExtractError>> {
        let init = PageState {
            client: self.client.clone(),
            policy: self.policy.clone(),
            next: Some(self.first_url.clone()),
            number: 0,
        };
        let resource_type = self.resource_type.clone();

        stream::try_unfold(init, move |mut state| {
            let resource_type = resource_type.clone();
            async move {
                let Some(url) = state.next.take() else {
                    return Ok(None);
                };

                let body = retry(&state.policy, || state.client.fetch_page(&url)).await?;
                let bundle = parse_bundle(body)?;
                state.number += 1;

                state.next = match bundle.next.as_deref() {
                    Some(next) => {
                        let next_url = Url::parse(next).or_else(|_| url.join(next)).map_err(|e| {
                            ExtractError::InvalidResponse(format!("invalid next link '{next}': {e}"))
                        })?;
                        if next_url == url {
                            return Err(ExtractError::InvalidResponse(format!(
                                "next link repeats the current page: {url}"
                            )));
                        }
                        Some(next_url)
                    }
                    None => None,
                };

                tracing::debug!(
                    resource_type = %resource_type,
                    page = state.number,
                    records = bundle.records.len(),
                    total = ?bundle.total,
                    has_next = state.next.is_some(),
                    "Fetched search page"
                );

                let page = Page {
                    number: state.number,
                    records: bundle.records,
                    has_next: state.next.is_some(),
                };
                Ok(Some((page, state)))
            }
        })
        .boxed()
    }

    /// Lazy stream of records across all pages
    pub fn records(&self) -> BoxStream<'static, std::result::Result<Record, ExtractError>> {
        self.pages()
            .map_ok(|page| stream::iter(page.records.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }

    /// Drain the search, applying the record cap
    ///
    /// # Errors
    ///
    /// Any page failure aborts the whole extraction; no watermark is produced.
    pub async fn collect(&self) -> std::result::Result<ExtractedBatch, ExtractError> {
        let mut batch = ExtractedBatch {
            records: Vec::new(),
            pages: 0,
            new_watermark: self.since,
            truncated: false,
        };

        let mut cap = RecordCap::new(self.max_records, self.since);
        let mut pages = self.pages();
        'pages: while let Some(page) = pages.try_next().await? {
            batch.pages += 1;
            for record in page.records {
                if !cap.admit(&record) {
                    batch.truncated = true;
                    break 'pages;
                }
                if let Some(updated) = record.last_updated() {
                    batch.new_watermark = batch.new_watermark.max(Some(updated));
                }
                batch.records.push(record);
            }
        }

        tracing::info!(
            resource_type = %self.resource_type,
            pages = batch.pages,
            records = batch.records.len(),
            since = ?self.since,
            new_watermark = ?batch.new_watermark,
            truncated = batch.truncated,
            "Extraction complete"
        );
        Ok(batch)
    }
}

/// Record cap that never splits a run of equal `lastUpdated` values
///
/// Records at or before the starting watermark are re-reads of the `ge`
/// boundary and do not count. Once the cap is reached, records sharing the
/// last counted timestamp are still admitted so the next run can start
/// strictly past them.
#[derive(Debug)]
struct RecordCap {
    cap: Option<usize>,
    since: Option<DateTime<Utc>>,
    counted: usize,
    closing: Option<Option<DateTime<Utc>>>,
}

impl RecordCap {
    fn new(cap: Option<usize>, since: Option<DateTime<Utc>>) -> Self {
        Self {
            cap,
            since,
            counted: 0,
            closing: None,
        }
    }

    /// Whether `record` belongs in the batch
    fn admit(&mut self, record: &Record) -> bool {
        let updated = record.last_updated();
        if let Some(last) = self.closing {
            return updated == last;
        }
        let reread = matches!((updated, self.since), (Some(u), Some(s)) if u <= s);
        if !reread {
            self.counted += 1;
        }
        if self.cap.is_some_and(|cap| self.counted >= cap) {
            self.closing = Some(updated);
        }
        true
    }
}
