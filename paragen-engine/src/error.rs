//! Error types for the constrained generation engine.

use crate::fsm::state::State;

/// Errors that can occur while building tables, running the FSM, or
/// mapping parameter values.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A `gen` state's computed allowed set was empty outside of a natural
    /// completion. Indicates a bug in table construction or context update.
    #[error("empty acceptor in state {state:?} (category prefix {category_prefix:?}, template prefix {template_prefix:?})")]
    SchemaEmptyAcceptor {
        state: State,
        category_prefix: Vec<u32>,
        template_prefix: Vec<u32>,
    },

    /// A `wait` state's recognition condition never fired within the
    /// configured token budget.
    #[error("literal '{expected}' not recognized within {budget} tokens")]
    LiteralMismatch { expected: String, budget: usize },

    /// A single generation ran past `max_document_tokens` without reaching
    /// the terminal state. Indicates a runaway stream rather than a normal
    /// completion.
    #[error("generation exceeded the {budget}-token document budget without reaching a terminal state")]
    DocumentTooLong { budget: usize },

    /// At init, a literal-encoded token fell inside the reserved value-token
    /// range. The value range MUST be disjoint from every other token.
    #[error("token {token} from literal {literal:?} collides with the reserved value range")]
    VocabularyCollision { token: u32, literal: String },

    /// A glyph the pose-array grammar depends on (` [`, digits, `,`, ...)
    /// did not encode to exactly one token under the loaded tokenizer.
    #[error("glyph {glyph:?} encoded to {got} tokens, expected exactly 1")]
    GlyphNotSingleToken { glyph: String, got: usize },

    /// Schema JSON failed to parse or referenced an empty category list.
    #[error("invalid schema")]
    InvalidSchema(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Persisted parameter-processor statistics failed to parse.
    #[error("invalid statistics file")]
    InvalidStatistics(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The embedded or user-supplied engine configuration failed to parse.
    #[error("invalid engine configuration")]
    ConfigParse(#[source] toml::de::Error),

    /// Tokenizer load failure (malformed `tokenizer.json`, missing file).
    #[error("tokenizer load failed")]
    TokenizerLoad(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
