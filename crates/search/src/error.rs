use thiserror::Error;

/// Configuration failures surfaced by `prepare`. Attached to the `anyhow`
/// chain so callers can classify failures by downcast; missing fields,
/// missing features, and empty option sets are *not* errors — they produce
/// empty results.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown scorer '{name}'")]
    UnknownScorer { name: String },

    #[error("invalid arguments for scorer '{name}': {message}")]
    InvalidScorerArgs { name: String, message: String },

    #[error("phrase slot at offset {offset} has unsupported kind '{kind}'")]
    UnsupportedPhraseSlot { offset: u32, kind: &'static str },

    #[error("invalid filter options: {0}")]
    InvalidOptions(String),
}

/// True iff `err` originated as a configuration error rather than a
/// propagated posting-source failure.
pub fn is_config_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<QueryError>().is_some()
}
