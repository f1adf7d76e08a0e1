//! Logic bodies: parsing, static analysis and sandboxed execution
//!
//! Bodies are JavaScript. Static analysis parses them with oxc; execution
//! runs them on an embedded QuickJS runtime that only sees the ECMAScript
//! built-ins, a small utility surface and the globals the host installs.

mod engine;
mod error;
mod guard;
mod syntax;
mod visit;

pub use engine::{Limits, Outcome, Sandbox};
pub use error::{ParseError, Result, ScriptError};
pub use syntax::member_references;
