// Rust guideline compliant 2026-10-18

//! Demo adapter for the `ReceiptPages` port.
//!
//! Stands in for the point-of-sale API. Each first-page request generates
//! receipts created since the previous request, then every receipt newer than
//! `since` is served in offset-cursor pages. Receipts stay available until the
//! caller's watermark moves past them, so a failed cycle sees them again.

use domain::{Clock, Receipt, ReceiptError, Timestamp};
use receipts::{ReceiptGenerator, ReceiptPage, ReceiptPages};
use std::cell::{Cell, RefCell};

/// `ReceiptPages` adapter over a [`ReceiptGenerator`].
#[derive(Debug)]
pub struct DemoReceiptPages<C> {
    generator: ReceiptGenerator,
    clock: C,
    receipts: RefCell<Vec<Receipt>>,
    generated_until: Cell<Option<Timestamp>>,
}

impl<C: Clock> DemoReceiptPages<C> {
    /// Serve receipts from `generator` up to the time `clock` reports.
    #[must_use]
    pub fn new(generator: ReceiptGenerator, clock: C) -> Self {
        Self {
            generator,
            clock,
            receipts: RefCell::new(vec![]),
            generated_until: Cell::new(None),
        }
    }

    /// Generate receipts up to now and forget those at or before `since`.
    fn refresh(&self, since: Timestamp) {
        let now = self.clock.now();
        let from = self.generated_until.get().map_or(since, |until| until.max(since));
        let batch = self.generator.generate(from, now);
        self.generated_until.set(Some(now));

        tracing::debug!(generated = batch.len(), "demo_receipt_pages.generated");
        let mut receipts = self.receipts.borrow_mut();
        receipts.retain(|r| r.created_at > since);
        receipts.extend(batch);
    }
}

impl<C: Clock> ReceiptPages for DemoReceiptPages<C> {
    async fn fetch_page(
        &self,
        since: Timestamp,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ReceiptPage, ReceiptError> {
        let offset = match cursor {
            None => {
                self.refresh(since);
                0
            }
            Some(cursor) => cursor.parse::<usize>().map_err(|e| ReceiptError::FetchFailed {
                reason: format!("bad cursor {cursor:?}: {e}"),
            })?,
        };

        let receipts = self.receipts.borrow();
        let pending: Vec<&Receipt> = receipts.iter().filter(|r| r.created_at > since).collect();
        let total = pending.len();
        let page: Vec<Receipt> = pending.into_iter().skip(offset).take(limit).cloned().collect();
        let next = offset + page.len();
        let cursor = (next < total).then(|| next.to_string());
        Ok(ReceiptPage { receipts: page, cursor })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
