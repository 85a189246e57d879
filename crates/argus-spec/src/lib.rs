//! Protocol schema model for the JDWP wire client.
//!
//! Parses the textual JDWP protocol spec (an S-expression grammar) into an
//! immutable tree of command sets, commands, and constant sets. The wire
//! crate drives its codec off the [`Argument`] tree instead of hand-writing
//! per-command encode/decode functions.

mod model;
mod sexpr;

use thiserror::Error;

pub use model::{
    Alt, Argument, Command, CommandSet, Constant, ConstantSet, ConstantValue, Spec,
};
pub use sexpr::Sexpr;

/// Errors raised while building a [`Spec`] from spec text, and by lookups
/// against the finished model. Construction is all-or-nothing: any parse
/// error means no `Spec` is published.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unbalanced parenthesis at byte {at}")]
    UnbalancedParens { at: usize },
    #[error("unterminated string literal starting at byte {at}")]
    UnterminatedString { at: usize },
    #[error("unrecognized form `{form}`")]
    UnknownForm { form: String },
    #[error("malformed declaration `{token}`")]
    MalformedDeclaration { token: String },
    #[error("expected a token at position {index}")]
    MissingToken { index: usize },
    #[error("duplicate field name `{name}`")]
    DuplicateField { name: String },
    #[error("duplicate declaration `{name}`")]
    DuplicateDeclaration { name: String },
    #[error("no command set named `{name}`")]
    UnknownCommandSet { name: String },
    #[error("no command named `{name}` in command set `{set}`")]
    UnknownCommand { set: String, name: String },
    #[error("no constant set named `{name}`")]
    UnknownConstantSet { name: String },
    #[error("no constant named `{name}` in constant set `{set}`")]
    UnknownConstant { set: String, name: String },
}
