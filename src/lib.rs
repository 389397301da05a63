pub mod config;
pub mod duplicates;
pub mod metadata;
pub mod security;
pub mod similarity;
