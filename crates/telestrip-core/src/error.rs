use thiserror::Error;

/// A structural problem with a patch file. Fatal: the run aborts before
/// anything is mutated, so a bad instruction can never be half-applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: unknown instruction '{keyword}'")]
    UnknownKeyword { line: usize, keyword: String },

    #[error("line {line}: '{keyword}' is missing an argument")]
    MissingArgument { line: usize, keyword: String },

    #[error("line {line}: malformed token '{token}' ({reason})")]
    BadToken {
        line: usize,
        token: String,
        reason: String,
    },

    #[error("line {line}: 'requires' must come before all operations")]
    MisplacedRequires { line: usize },

    #[error("line {line}: cannot read replacement source '{source_path}' ({reason})")]
    UnreadableSource {
        line: usize,
        source_path: String,
        reason: String,
    },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::UnknownKeyword { line, .. }
            | ParseError::MissingArgument { line, .. }
            | ParseError::BadToken { line, .. }
            | ParseError::MisplacedRequires { line }
            | ParseError::UnreadableSource { line, .. } => *line,
        }
    }
}

/// A logical path that normalizes outside the installation root. Fatal for
/// the whole run: the operation set itself cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("path '{logical}' escapes the installation root")]
pub struct PathEscapeError {
    pub logical: String,
}
