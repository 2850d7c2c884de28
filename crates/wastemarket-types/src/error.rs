/// Error raised while parsing or decoding marketplace values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    InvalidAddress(String),
    InvalidAmount(String),
    InvalidHex(String),
    /// ABI return data shorter than the layout requires.
    Truncated { needed: usize, got: usize },
    Overflow(&'static str),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress(s) => write!(f, "invalid address: {s}"),
            Self::InvalidAmount(s) => write!(f, "invalid amount: {s}"),
            Self::InvalidHex(s) => write!(f, "invalid hex: {s}"),
            Self::Truncated { needed, got } => {
                write!(f, "abi data truncated: need {needed} bytes, got {got}")
            }
            Self::Overflow(what) => write!(f, "{what} does not fit"),
        }
    }
}

impl std::error::Error for CodecError {}
