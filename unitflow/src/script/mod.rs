//! Compile-and-invoke script capability used by the Where and Script units.
//!
//! The bundled engine implements a small sandboxed language: `let` and
//! path assignments, `if`/`else`, `return`, arithmetic, comparison and
//! logical operators, and a fixed set of helper functions. There are no
//! loops and no I/O beyond the `query`/`execute` database helpers.
//!
//! ```text
//! let total = input.qty * input.price;
//! if total > cfg.settings.threshold {
//!     input.flagged = true;
//! }
//! hasMore = false;
//! ```

mod eval;
mod lexer;
mod parser;

use crate::context::{Context, Value};
use crate::db::DbFacade;
use crate::errors::ScriptError;
use std::fmt::Debug;

/// Name of the implicit parameter holding the unit's input context.
pub const INPUT: &str = "input";

/// A global name made visible to a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Global {
    /// Identifier as written in scripts (case-insensitive).
    pub name: &'static str,
    /// Whether scripts may assign to it.
    pub writable: bool,
}

impl Global {
    /// A global scripts may read but not assign.
    #[must_use]
    pub const fn read_only(name: &'static str) -> Self {
        Self {
            name,
            writable: false,
        }
    }

    /// A global scripts may assign.
    #[must_use]
    pub const fn writable(name: &'static str) -> Self {
        Self {
            name,
            writable: true,
        }
    }
}

/// Everything a script invocation can see and mutate.
pub struct ScriptScope<'a> {
    /// The implicit `input` parameter.
    pub input: Context,
    /// Values of the declared globals, keyed by name.
    pub globals: Context,
    /// Database used by `query` and `execute`.
    pub db: &'a mut dyn DbFacade,
}

impl Debug for ScriptScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptScope")
            .field("input", &self.input)
            .field("globals", &self.globals)
            .finish_non_exhaustive()
    }
}

/// A compiled script, invocable any number of times.
pub trait CompiledScript: Send + Sync + Debug {
    /// Runs the script and returns its result value.
    fn invoke(&self, scope: &mut ScriptScope<'_>) -> Result<Value, ScriptError>;
}

/// Compiles script source against a set of declared globals.
pub trait ScriptEngine: Send + Sync + Debug {
    /// Compiles `source`. Reading a name that is neither `input`, a declared
    /// global nor assigned in the script is a compile error.
    fn compile(
        &self,
        source: &str,
        globals: &[Global],
    ) -> Result<Box<dyn CompiledScript>, ScriptError>;
}

/// The bundled sandboxed script engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinScriptEngine;

impl BuiltinScriptEngine {
    /// Creates a new engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ScriptEngine for BuiltinScriptEngine {
    fn compile(
        &self,
        source: &str,
        globals: &[Global],
    ) -> Result<Box<dyn CompiledScript>, ScriptError> {
        let tokens = lexer::tokenize(source)?;
        let program = parser::parse(tokens)?;
        let script = eval::Program::check(program, globals)?;
        Ok(Box::new(script))
    }
}
