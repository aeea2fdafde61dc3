//! # wat-grammar
//!
//! A declarative TextMate-style scanning grammar for the WebAssembly text
//! format (`.wat`).
//!
//! The crate has two layers:
//!
//! - [`textmate`]: a generic grammar toolkit. Pattern fragments are composed
//!   with pure combinators, assembled into match, region and disjunction rules,
//!   registered by name into a validated repository and emitted as the static
//!   description a host scanning runtime (editor highlighter) consumes.
//! - [`wat`]: the WebAssembly text format lexeme table and rule graph built on
//!   that toolkit.
//!
//! ```rust-example
//! use wat_grammar::textmate::emitter::GrammarEmitter;
//!
//! let repository = wat_grammar::wat::repository()?;
//! let json = GrammarEmitter::with_defaults()?.emit(&repository)?;
//! ```
//!
//! ## Testing
//!
//! Rule behavior is verified by replaying sample text through the reference
//! scanner in [`textmate::testing`].

pub mod textmate;
pub mod wat;
