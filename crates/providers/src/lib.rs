//! Model provider implementations for Canopy.
//!
//! All providers implement the `canopy_core::Provider` trait.
//! [`RetryingProvider`] layers the configured backoff over any of them.

pub mod embedder;
pub mod openai_compat;
pub mod retry;

pub use embedder::ProviderEmbedder;
pub use openai_compat::OpenAiCompatProvider;
pub use retry::{RetryPolicy, RetryingProvider};
