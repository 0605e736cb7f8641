pub mod anonymize;
pub mod config;
pub mod events;
pub mod narratives;
pub mod prompts;
pub mod research;
