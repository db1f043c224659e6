//! # rill-expr
//!
//! The template expression language: a small script-like grammar parsed once
//! into an AST and interpreted against an explicit [`ScopeChain`].
//!
//! ```text
//! {{ user.name |> upper }}            interpolation with a filter pipeline
//! @click="#toggle(item); open = true" handler with a stateful call
//! *bind="form.email"                  setter over an assignable path
//! ```
//!
//! [`Compiler`] produces getters, setters, handlers and interpolation
//! templates, memoized by source text.

mod ast;
mod builtins;
mod compiler;
mod error;
mod eval;
mod filter;
mod lexer;
mod parser;
mod rewrite;
pub mod template;

pub use builtins::Globals;
pub use compiler::{Compiler, Evaluator, Form};
pub use error::{CompileError, EvalError};
pub use eval::{Locals, Scope, ScopeChain, get_property, property_key, set_property};
pub use filter::{Filter, FilterFn, FilterRegistry};
pub use rewrite::{COMMIT, rewrite_stateful_calls};
pub use template::{Template, has_interpolation};
