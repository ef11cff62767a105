use thiserror::Error;

/// Everything the assembler or store construction can reject.
///
/// Assembly errors carry the 1-based source line they were raised on
/// and abort that `assemble` call; words emitted earlier in the same
/// call stay in the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Malformed line, unknown operator or condition mnemonic, or an
    /// unevaluable literal expression.
    #[error("line {line}: {msg}")]
    Syntax { line: usize, msg: String },

    /// A resolved relative offset does not fit the 3-bit field.
    #[error("line {line}: relative offset {offset} is outside [-4, 3]")]
    Range { line: usize, offset: i64 },

    /// Reference to a label no pass ever bound.
    #[error("line {line}: undefined label `{name}`")]
    Reference { line: usize, name: String },

    /// The same label bound twice in one assembly.
    #[error("line {line}: label `{name}` is already defined")]
    Redefinition { line: usize, name: String },

    /// `$`-prefixed operand. This architecture has no immediate mode;
    /// all addressing is relative direct or indirect.
    #[error("line {line}: immediate addressing is not supported")]
    Immediate { line: usize },

    /// Store construction with a non-positive size.
    #[error("core size must be positive")]
    InvalidSize,
}
