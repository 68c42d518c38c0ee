use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("empty frame")]
    EmptyFrame,
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),
    #[error("frame is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown cell symbol {0:?}")]
    UnknownCell(String),
    #[error("unknown result token {0:?}")]
    UnknownResult(String),
    #[error("board position out of range: row {row}, col {col}")]
    IndexOutOfRange { row: usize, col: usize },
    #[error("empty peer identity")]
    EmptyPeerId,
}
