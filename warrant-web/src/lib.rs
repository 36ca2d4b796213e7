//! Listing acquisition: browser sessions, page fetching, and record extraction.
//!
//! - `browser`: the [`browser::ListingSession`] seam and its fantoccini-backed implementation
//! - `pool`: bounded pool of browser session slots
//! - `fetch`: [`fetch::PageFetcher`], a lazy page-by-page listing stream
//! - `extract`: pure HTML row parsing and [`extract::RecordExtractor`]

pub mod browser;
pub mod extract;
pub mod fetch;
pub mod pool;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use extract::{Extraction, RecordExtractor};
pub use fetch::{FetchError, FetchPolicy, PageFetcher};
pub use pool::{SessionLease, SessionPool};
