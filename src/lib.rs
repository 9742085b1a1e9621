//! A parser and compiler for C foreign-function declarations.
//!
//! The crate turns a `cdef`-style source text (declarations plus a handful
//! of `...` extensions for things the caller does not want to spell out)
//! into an interned type model, a declaration registry, and finally a
//! deterministic bytecode module that a runtime registry can load back
//! without reparsing anything.
//!
//! The main entry point is [`ffi::Ffi`]:
//!
//! ```
//! use ffidef::{Ffi, ModuleKind};
//!
//! let mut ffi = Ffi::new();
//! ffi.cdef("typedef struct { int x, y; } point_t; int dist(point_t *);")?;
//! let module = ffi.compile("geom", ModuleKind::Api)?;
//! assert!(module.render().contains("point_t"));
//! # Ok::<(), ffidef::Error>(())
//! ```

pub mod ast;
/// Contains the bytecode compiler.
pub mod compiler;
pub mod declarations;
/// Contains the error types for the crate.
pub mod error;
/// Contains the user-facing interface.
pub mod ffi;
pub mod lexer;
/// Contains the interned type model.
pub mod model;
pub mod opcode;
pub mod parser;
/// Contains the `#define` harvesting preprocessor.
pub mod preprocess;
/// Contains the runtime type registry.
pub mod runtime;
/// Contains the semantic analyzer.
pub mod semantic;
pub mod source;

pub use symbol_table::GlobalSymbol as StringId;

pub use crate::compiler::{Module, ModuleKind};
pub use crate::declarations::{DeclKey, DeclarationKind, DeclarationRegistry};
pub use crate::error::{DeclarationError, Error, VerificationError};
pub use crate::ffi::{CdefOptions, Ffi};
pub use crate::model::{TypeRef, TypeTable};
pub use crate::runtime::TypeRegistry;
