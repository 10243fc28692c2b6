//! recall-core
//!
//! Shared vocabulary of the retrieval workspace: chunk/candidate/result types,
//! the index and embedder traits, typed configuration, the error taxonomy and
//! the tokenizer both lexical backends agree on.

pub mod config;
pub mod error;
pub mod tokenize;
pub mod traits;
pub mod types;
pub mod vecmath;

pub use error::{Error, ErrorKind, Result, Stage};
