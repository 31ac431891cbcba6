//! GitHub Actions REST API implementation of the ghwatch data source.

pub mod client;
pub mod page;

pub use client::{ClientConfig, GitHubClient, DEFAULT_API_URL};
