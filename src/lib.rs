//! # adwatch
//!
//! Polls classified-ad listing pages and sends one consolidated alert for
//! every batch of newly published listings.
//!
//! ## Architecture
//!
//! adwatch runs one polling cycle at a time:
//!
//! ```text
//! Store (load) → Scheduler → Detector × sources → merge → Store (save) → Notifier
//! ```
//!
//! - [`store`]: SQLite record of every listing identity already alerted on
//! - [`scheduler`]: Sizes the worker pool from idle CPU cores
//! - [`detector`]: Fetches a source and diffs it against known identities
//! - [`coordinator`]: Runs cycles forever, persisting before notifying
//! - [`notifier`]: Email or log delivery of the cycle digest
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a config template, then edit it
//! adwatch run
//!
//! # Poll once and exit
//! adwatch once
//!
//! # Show what has already been seen
//! adwatch known --limit 10
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// store, fetcher, scheduler, notifier.
pub mod app;

/// Configuration loading and validation.
///
/// Loads from `~/.config/adwatch/config.toml`; the SMTP password may come
/// from `ADWATCH_SMTP_PASSWORD` or a `.env` file.
pub mod config;

/// Polling cycle orchestration and graceful shutdown.
pub mod coordinator;

/// Command-line interface using clap.
///
/// - `run` - Poll forever
/// - `once` - Run a single cycle
/// - `known` - List known identities
pub mod cli;

/// Per-source new item detection.
pub mod detector;

/// Core domain models.
///
/// - [`Item`](domain::Item): A listing with a stable identifier
/// - [`Source`](domain::Source): A listing page to poll
/// - [`CycleResult`](domain::CycleResult): New items found in one cycle
pub mod domain;

/// Listing page fetchers.
///
/// - [`SourceFetcher`](fetcher::SourceFetcher): Async trait used by the detector
/// - [`HttpFetcher`](fetcher::HttpFetcher): reqwest + HTML query
/// - [`ChromeFetcher`](fetcher::ChromeFetcher): Headless Chrome via chromiumoxide
pub mod fetcher;

/// Delivery of the per-cycle digest.
pub mod notifier;

/// Availability-aware worker pool sizing.
pub mod scheduler;

/// SQLite persistence layer.
///
/// - [`IdentityStore`](store::IdentityStore): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
