//! LLM provider implementations for deepsearch.
//!
//! All providers implement the `deepsearch_core::Provider` trait.
//! [`LlmClient`] picks the model for each role from configuration.

pub mod llm;
pub mod openai_compat;

pub use llm::{parse_structured, LlmClient};
pub use openai_compat::OpenAiCompatProvider;
