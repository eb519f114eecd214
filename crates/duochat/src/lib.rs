//! Duochat - one chat experience over a streaming and a batch LLM provider.

pub mod cli;
pub mod config;
pub mod conversation;
pub mod llm;
pub mod normalize;
pub mod orchestrator;
pub mod payload;
