//! HTTP fetching of individual sources.

pub mod fetcher;

pub use fetcher::{Fetcher, DEFAULT_CALLER_HEADER, DEFAULT_TIMEOUT};
