use thiserror::Error;

/// Errors that can occur during Shirushi core operations.
#[derive(Debug, Error)]
pub enum ShirushiError {
    /// A data or resource file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A line in an external resource file does not match its format.
    #[error("malformed line {line} in {path}: {reason}")]
    MalformedLine {
        /// File the line came from.
        path: String,
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// The pretrained embedding file produced no usable words.
    #[error("empty vocabulary after loading {path}")]
    EmptyVocabulary {
        /// The embedding file that was loaded.
        path: String,
    },

    /// A tag dictionary was built from an empty tag set.
    #[error("tag dictionary has no real tags")]
    EmptyTagSet,

    /// A tag string was looked up that the dictionary does not contain.
    #[error("unknown tag {tag:?}")]
    UnknownTag {
        /// The offending tag string.
        tag: String,
    },

    /// A sequence had an unexpected length for the operation.
    #[error("sequence length mismatch: {reason}")]
    LengthMismatch {
        /// Which lengths disagreed.
        reason: String,
    },

    /// Scoring or decoding was asked to run on an empty sentence.
    #[error("cannot score an empty sentence")]
    EmptySentence,

    /// Candle tensor operation failed.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for Shirushi operations.
pub type Result<T> = std::result::Result<T, ShirushiError>;
