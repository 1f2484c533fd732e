//! Pluggable streaming chat-completion client.
//!
//! A caller hands [`client::CompletionClient::send`] a list of messages, call
//! options and an [`protocol::profile::EndpointProfile`]; the returned
//! [`client::CompletionStream`] yields normalized
//! [`protocol::canonical::ChunkResult`]s regardless of the backend's wire
//! format.

pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod observability;
pub mod protocol;
pub mod request;
pub mod stream;
pub mod transport;

pub use client::{CompletionClient, CompletionStream};
pub use error::ClientError;
