pub mod analyzer;
pub mod api;
pub mod chunk;
