//! Resource limits for values built while running snippets

/// Highest array index a write may pad an array out to
///
/// Writing `#N` past the end of an array fills the gap with `null`; indexes
/// at or above this bound are reported as out of range instead.
pub const MAX_ARRAY_INDEX: usize = 1_000_000;

/// Maximum length of a repeated string in bytes or a repeated array in
/// elements
pub const MAX_REPEAT_LEN: usize = 16 * 1024 * 1024;

/// Maximum number of elements `range()` may produce
pub const MAX_RANGE_LEN: usize = 16 * 1024 * 1024;

/// Maximum nesting depth of expressions and blocks in one snippet, counting
/// each operator in a chain as one level
pub const MAX_NESTING_DEPTH: usize = 100;

/// Maximum depth of expression evaluation and block execution
///
/// Any program the parser accepts stays well below this; it bounds programs
/// assembled directly from AST nodes.
pub const MAX_EVAL_DEPTH: usize = 4 * MAX_NESTING_DEPTH;
