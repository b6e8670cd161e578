//! Semantic checking.
//!
//! Two passes over newly parsed statements. The [`GlobalChecker`] walks
//! top-level declarations into the symbol tree: namespaces, struct shells
//! and their field entries, and function overload sets. The
//! [`LocalChecker`] then resolves annotations, type-checks statements and
//! expressions, installs symbol-tree links on name references, and
//! enforces the mutability, lvalue, and unsafe rules.

mod global;
mod local;

pub use global::GlobalChecker;
pub use local::LocalChecker;
