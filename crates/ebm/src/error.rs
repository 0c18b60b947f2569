/// Errors raised by the sampler, the chain bank and configuration checks.
#[derive(Debug, thiserror::Error)]
pub enum EbmError {
    /// Configuration that can never produce a valid run (unknown policy,
    /// incompatible net/data, bank smaller than a batch, existing output dir).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A training quantity left the finite range (diverging Langevin chain).
    #[error("Non-finite {quantity} at iteration {iteration}: {value}")]
    NonFinite {
        iteration: usize,
        quantity: &'static str,
        value: f64,
    },

    /// Reverse pass produced no gradient for the sampler state.
    #[error("Energy function produced no gradient with respect to its input")]
    MissingInputGradient,

    /// Dataset file is missing or malformed.
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EbmError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
