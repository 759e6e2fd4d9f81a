// Rust guideline compliant 2026-10-18

//! Receipt intake -- drains a paginated point-of-sale API into the
//! [`ReceiptSource`] port, and generates synthetic receipts for demo runs.
//!
//! Entry points: [`fetch_receipts_since`], [`PagedReceiptSource`],
//! [`ReceiptGenerator::generate`]. Configuration via [`PagingConfig::builder`]
//! and [`GeneratorConfig::builder`].

use chrono::TimeDelta;
use domain::{Receipt, ReceiptError, ReceiptSource, Timestamp};
use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};
use std::cell::RefCell;

// ---------------------------------------------------------------------------
// ReceiptsError
// ---------------------------------------------------------------------------

/// Errors raised while configuring receipt components.
#[derive(Debug, thiserror::Error)]
pub enum ReceiptsError {
    /// The supplied configuration is invalid.
    #[error("invalid receipts configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Pagination port
// ---------------------------------------------------------------------------

/// One page of receipts as returned by the point-of-sale API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptPage {
    /// Receipts on this page, oldest first.
    pub receipts: Vec<Receipt>,
    /// Opaque continuation token. `None` on the last page.
    pub cursor: Option<String>,
}

/// Page-level access to the point-of-sale receipt API.
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait ReceiptPages {
    /// Fetch up to `limit` receipts created after `since`, continuing from
    /// `cursor` when given.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::FetchFailed`] when the API call fails.
    async fn fetch_page(
        &self,
        since: Timestamp,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ReceiptPage, ReceiptError>;
}

/// Fetch every receipt created strictly after `since`, page by page.
///
/// Stops on a page without a cursor or with fewer than `page_size` receipts.
///
/// # Errors
///
/// Propagates the first page error; pages already read are discarded. Returns [`ReceiptError::TooManyPages`]
/// when more than `max_pages` pages would be needed.
pub async fn fetch_receipts_since<P: ReceiptPages>(
    pages: &P,
    since: Timestamp,
    page_size: usize,
    max_pages: usize,
) -> Result<Vec<Receipt>, ReceiptError> {
    let mut receipts = vec![];
    let mut cursor: Option<String> = None;

    for page_number in 1..=max_pages {
        let page = pages.fetch_page(since, cursor.as_deref(), page_size).await?;
        let short = page.receipts.len() < page_size;
        tracing::debug!(
            page = page_number,
            size = page.receipts.len(),
            "receipts.page.fetched"
        );
        receipts.extend(page.receipts);

        match page.cursor {
            Some(next) if !short => cursor = Some(next),
            _ => {
                tracing::info!(count = receipts.len(), pages = page_number, "receipts.fetch.done");
                return Ok(receipts);
            }
        }
    }

    tracing::warn!(max_pages, "receipts.fetch.page_limit");
    Err(ReceiptError::TooManyPages { max_pages })
}

// ---------------------------------------------------------------------------
// PagingConfig + builder
// ---------------------------------------------------------------------------

/// Paging limits for a [`PagedReceiptSource`].
///
/// Construct via [`PagingConfig::builder`].
#[derive(Debug, Clone)]
pub struct PagingConfig {
    /// Receipts requested per page.
    pub page_size: usize,
    /// Upper bound on pages per fetch.
    pub max_pages: usize,
}

/// Builder for [`PagingConfig`].
#[derive(Debug)]
pub struct PagingConfigBuilder {
    page_size: usize,
    max_pages: usize,
}

impl PagingConfig {
    /// Create a builder.
    ///
    /// Default values: `page_size = 250`, `max_pages = 100`.
    #[must_use]
    pub fn builder() -> PagingConfigBuilder {
        PagingConfigBuilder { page_size: 250, max_pages: 100 }
    }
}

impl PagingConfigBuilder {
    /// Receipts requested per page.
    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Pages fetched before the window is declared too large.
    #[must_use]
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptsError::InvalidConfig`] when either limit is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<PagingConfig, ReceiptsError> {
        if self.page_size == 0 {
            return Err(ReceiptsError::InvalidConfig {
                reason: "page_size must be >= 1".to_owned(),
            });
        }
        if self.max_pages == 0 {
            return Err(ReceiptsError::InvalidConfig {
                reason: "max_pages must be >= 1".to_owned(),
            });
        }
        Ok(PagingConfig { page_size: self.page_size, max_pages: self.max_pages })
    }
}

// ---------------------------------------------------------------------------
// PagedReceiptSource
// ---------------------------------------------------------------------------

/// [`ReceiptSource`] over any [`ReceiptPages`] API.
#[derive(Debug)]
pub struct PagedReceiptSource<P> {
    pages: P,
    config: PagingConfig,
}

impl<P: ReceiptPages> PagedReceiptSource<P> {
    /// Wrap a page port.
    #[must_use]
    pub fn new(pages: P, config: PagingConfig) -> Self {
        Self { pages, config }
    }

    /// The wrapped page port.
    #[must_use]
    pub fn pages(&self) -> &P {
        &self.pages
    }
}

impl<P: ReceiptPages> ReceiptSource for PagedReceiptSource<P> {
    async fn receipts_since(&self, since: Timestamp) -> Result<Vec<Receipt>, ReceiptError> {
        fetch_receipts_since(&self.pages, since, self.config.page_size, self.config.max_pages).await
    }
}

// ---------------------------------------------------------------------------
// GeneratorConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`ReceiptGenerator`].
///
/// Construct via [`GeneratorConfig::builder`].
#[derive(Debug)]
pub struct GeneratorConfig {
    /// Maximum receipts per generated batch (range: `[0, max_receipts]`).
    pub max_receipts: usize,
    /// Percentage of receipts with no customer attached, in `[0, 100]`.
    pub walk_in_percent: u32,
    /// Optional RNG seed. `None` seeds from the OS.
    pub seed: Option<u64>,
}

/// Builder for [`GeneratorConfig`].
#[derive(Debug)]
pub struct GeneratorConfigBuilder {
    max_receipts: usize,
    walk_in_percent: u32,
    seed: Option<u64>,
}

impl GeneratorConfig {
    /// Create a builder. `max_receipts` is the only required parameter.
    ///
    /// Default values: `walk_in_percent = 20`, `seed = None`.
    #[must_use]
    pub fn builder(max_receipts: usize) -> GeneratorConfigBuilder {
        GeneratorConfigBuilder { max_receipts, walk_in_percent: 20, seed: None }
    }
}

impl GeneratorConfigBuilder {
    /// Share of receipts generated without a customer, `0..=100`.
    #[must_use]
    pub fn walk_in_percent(mut self, percent: u32) -> Self {
        self.walk_in_percent = percent;
        self
    }

    /// Fix the RNG seed for deterministic output (useful in tests).
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptsError::InvalidConfig`] when `max_receipts` is zero or
    /// `walk_in_percent` exceeds 100.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<GeneratorConfig, ReceiptsError> {
        if self.max_receipts == 0 {
            return Err(ReceiptsError::InvalidConfig {
                reason: "max_receipts must be >= 1".to_owned(),
            });
        }
        if self.walk_in_percent > 100 {
            return Err(ReceiptsError::InvalidConfig {
                reason: format!("walk_in_percent must be <= 100, got {}", self.walk_in_percent),
            });
        }
        Ok(GeneratorConfig {
            max_receipts: self.max_receipts,
            walk_in_percent: self.walk_in_percent,
            seed: self.seed,
        })
    }
}

// ---------------------------------------------------------------------------
// ReceiptGenerator
// ---------------------------------------------------------------------------

/// Produces synthetic receipts for a fixed set of loyalty ids.
#[derive(Debug)]
pub struct ReceiptGenerator {
    config: GeneratorConfig,
    customers: Vec<String>,
    rng: RefCell<StdRng>,
}

impl ReceiptGenerator {
    /// Create a generator drawing customers from `customers`.
    ///
    /// An empty customer list yields walk-in receipts only.
    #[must_use]
    pub fn new(config: GeneratorConfig, customers: Vec<String>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { config, customers, rng: RefCell::new(rng) }
    }

    /// Generate a batch of receipts created in `(since, until]`, sorted by
    /// creation time.
    ///
    /// Returns an empty batch when the interval is empty.
    #[must_use]
    pub fn generate(&self, since: Timestamp, until: Timestamp) -> Vec<Receipt> {
        let span = (until - since).num_seconds();
        if span <= 0 {
            return vec![];
        }

        let mut rng = self.rng.borrow_mut();
        let size = rng.random_range(0..=self.config.max_receipts);
        let mut batch = Vec::with_capacity(size);
        for _ in 0..size {
            let mut bytes = [0u8; 16];
            rng.fill_bytes(&mut bytes);
            let receipt_number = uuid::Builder::from_random_bytes(bytes).into_uuid().to_string();

            let walk_in = self.customers.is_empty()
                || rng.random_range(0..100) < self.config.walk_in_percent;
            let customer_id = if walk_in {
                None
            } else {
                let idx = rng.random_range(0..self.customers.len());
                Some(self.customers[idx].clone())
            };

            let created_at = since + TimeDelta::seconds(rng.random_range(1..=span));
            batch.push(Receipt { receipt_number, customer_id, created_at });
        }
        batch.sort_by_key(|r| r.created_at);
        batch
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
