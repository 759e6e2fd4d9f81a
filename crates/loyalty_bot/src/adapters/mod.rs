// Rust guideline compliant 2026-10-18

//! Adapters (secondary ports) for the loyalty bot binary.
//!
//! Each sub-module implements one hexagonal port trait defined in the
//! `domain` or `receipts` crate.

pub mod demo_receipt_pages;
pub mod in_memory_directory;
pub mod in_memory_ledger;
pub mod log_messenger;
pub mod sqlite_directory;
