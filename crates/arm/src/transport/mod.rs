//! Transport layer for the ARM client.

pub mod http;

pub use http::{HttpTransport, Page};
