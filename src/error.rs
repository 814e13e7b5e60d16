use thiserror::Error;

/// The error kinds reported to the [`ErrorHandler`] during compression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("unknown error")]
    Unknown,
    #[error("invalid input")]
    InvalidInput,
    #[error("unsupported feature")]
    UnsupportedFeature,
    #[error("cuda error")]
    CudaError,
    #[error("could not open output file")]
    FileOpen,
    #[error("could not write to output")]
    FileWrite,
    #[error("the container does not support the requested output format")]
    UnsupportedOutputFormat,
}

/// Callback invoked once per error with the specific kind. The caller may
/// observe and ignore; the compression call itself also fails with the same
/// kind.
pub trait ErrorHandler {
    fn error(&mut self, kind: ErrorKind);
}

impl<F: FnMut(ErrorKind)> ErrorHandler for F {
    fn error(&mut self, kind: ErrorKind) {
        self(kind)
    }
}
