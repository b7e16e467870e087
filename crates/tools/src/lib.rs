//! External research backends for deepsearch.
//!
//! - [`SerpApiSearch`]: Google results through SerpAPI
//! - [`JinaReader`]: page content through the Jina reader

pub mod page_fetch;
pub mod web_search;

pub use page_fetch::JinaReader;
pub use web_search::SerpApiSearch;
