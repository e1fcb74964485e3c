pub mod client;

pub use client::{CompletionClient, LlmClient, LlmError};
