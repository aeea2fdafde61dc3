//! Generic TextMate-style grammar toolkit

pub mod config;
pub mod emitter;
pub mod error;
pub mod pattern;
pub mod repository;
pub mod rule;
pub mod testing;

pub use emitter::GrammarEmitter;
pub use error::GrammarError;
pub use repository::{Metadata, Repository, RepositoryBuilder};
pub use rule::{include, MatchRule, Pattern, RegionRule, Rule};
