pub mod api;
pub mod assembler;
pub mod config;
pub mod error;
pub mod extractor;
pub mod gangsheet;
pub mod render;
pub mod settings;
pub mod shelf;
pub mod solver;
pub mod store;
pub mod types;
