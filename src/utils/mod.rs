// src/utils/mod.rs
pub mod http;

pub use http::{FetchedResponse, HttpClient};
