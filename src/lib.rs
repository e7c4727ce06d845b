//! # tabman
//!
//! Capture the tabs open in a Chromium-based browser, read each page,
//! classify it with an LLM (or offline rules), and keep a searchable
//! archive of everything you had open.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌─────────────┐   ┌───────────┐
//! │ TabCapture │──▶│ContentFetcher│──▶│ Categorizer │──▶│ TabSaver  │
//! │ /json/list │   │ bounded pool │   │ provider    │   │ snapshot  │
//! └────────────┘   └──────────────┘   │ fallback    │   │ + ledger  │
//!                                     └─────────────┘   └─────┬─────┘
//!                                                             │
//!                                                       ┌─────▼─────┐
//!                                                       │SearchIndex│
//!                                                       └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! brave --remote-debugging-port=9222 &
//! tabman capture                    # capture, classify, save
//! tabman search rust --sort host    # query saved tabs
//! tabman categories                 # browse by category
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`capture`] | Tab enumeration and exclusion rules |
//! | [`fetch`] | Page and caption retrieval |
//! | [`text`] | HTML flattening and text repair |
//! | [`categorize`] | Provider trait and fallback chain |
//! | [`save`] | Snapshots, markdown mirror, ledger |
//! | [`search`] | Filtered, sorted queries over snapshots |
//! | [`pipeline`] | The end-to-end capture run |
//! | [`providers`] | Provider readiness listing |
//! | [`progress`] | Stderr progress reporting |
//! | [`error`] | Typed per-stage errors |

pub mod capture;
pub mod categorize;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod providers;
pub mod save;
pub mod search;
pub mod text;

pub use capture::capture;
pub use categorize::Categorizer;
pub use models::{CaptureSession, CategorizationResult, Tab};
pub use save::{Ledger, TabSaver};
pub use search::{SearchIndex, SearchQuery, SortKey};
