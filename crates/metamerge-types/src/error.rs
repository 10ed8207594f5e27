use thiserror::Error;

/// Errors produced while building or decoding documents.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// A decoded value has no `DocumentValue` representation.
    #[error("unsupported value kind: {kind}")]
    UnsupportedValueKind { kind: String },

    /// A document root was expected to be a map.
    #[error("expected a map at the document root, got {kind}")]
    NotADocument { kind: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TypeError {
    pub fn unsupported(kind: impl Into<String>) -> Self {
        Self::UnsupportedValueKind { kind: kind.into() }
    }
}
