use thiserror::Error;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Failures of the store, combiner, evaluator and optimizer.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("inconsistent score schema in run '{run_id}': {detail}")]
    Schema { run_id: String, detail: String },

    #[error("unknown score dimension '{dimension}'")]
    Dimension { dimension: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("topic {topic_id} has no evaluable documents")]
    EmptyRanking { topic_id: u32 },

    #[error("failed to parse {source_name} line {line}: {reason}")]
    Parse {
        source_name: String,
        line: usize,
        reason: String,
    },

    #[error("storage failure")]
    Storage(#[from] rusqlite::Error),

    #[error("backend failure: {0}")]
    Backend(String),
}

impl CoreError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn parse(source_name: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            line,
            reason: reason.into(),
        }
    }
}
