use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Document store error: {0}")]
    Store(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod backfill;
pub mod commands;
pub mod config;
pub mod database;
pub mod openai;
pub mod rag;
pub mod server;
