//! Driver layer for browser automation.
//!
//! This crate exposes the WebDriver session wrapper and page helpers used by
//! the listing fetcher.
//!
//! - [`warrant_browser::driver::WarrantDriver`]: WebDriver client wrapper
//! - [`warrant_browser::page::ListingPage`]: navigation, readiness waits, DOM source
//! - [`warrant_browser::behavioral::BehavioralEngine`]: human-like pacing and backoff jitter
//! - [`warrant_browser::stealth`]: stealth profiles and JS evasions
pub mod warrant_browser;
