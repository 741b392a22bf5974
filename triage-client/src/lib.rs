//! Resilient client for the paginated patient API.

pub mod client;
pub mod envelope;
pub mod pagination;
pub mod transport;

pub use client::ApiClient;
pub use envelope::PageEnvelope;
pub use pagination::{fetch_all, FetchOptions, FetchResult, PageSource, ScanState};
pub use transport::{
    HttpResponse, ResponseBody, Transport, TransportConfig, TransportError, MAX_RETRY_HINT,
};
