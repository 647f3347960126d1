#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("not enough bytes: have {actual}, need {minimum}")]
    Truncated { actual: usize, minimum: usize },

    #[error("arithmetic overflow")]
    Overflow,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
