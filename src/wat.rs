//! WebAssembly text format grammar
//!
//! [`repository`] builds and validates the complete rule graph; hand it to a
//! [`GrammarEmitter`](crate::textmate::emitter::GrammarEmitter) to produce
//! the artifact.

pub mod grammar;
pub mod token;

use crate::textmate::error::GrammarError;
use crate::textmate::repository::{Metadata, Repository, RepositoryBuilder};
use tracing::debug;

pub fn metadata() -> Metadata {
    Metadata {
        name: "WebAssembly Module".to_string(),
        scope_name: "source.wasm.wat".to_string(),
        file_types: vec![".wat".to_string()],
    }
}

/// Build the validated WAT repository.
pub fn repository() -> Result<Repository, GrammarError> {
    let mut builder = RepositoryBuilder::new(metadata());
    grammar::register(&mut builder)?;
    let repository = builder.build(grammar::entry())?;
    debug!(
        rules = repository.len(),
        placeholders = ?repository.placeholders(),
        "built WebAssembly text grammar"
    );
    Ok(repository)
}
