//! Concrete chat backends.

pub mod ollama_service;
pub mod openai_compat;
pub mod scripted;
