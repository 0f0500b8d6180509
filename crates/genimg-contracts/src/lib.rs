pub mod config;
pub mod naming;
pub mod prompts;
pub mod tools;
