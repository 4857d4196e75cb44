use ht_screen::ScreenError;
use thiserror::Error;

/// Coarse classification of a [`HalftoneError`], used by callers to decide
/// whether to abort a fill, a page, or the whole job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An allocation failed.
    OutOfMemory,
    /// Buffer too small, or input malformed, short or inconsistent.
    RangeCheck,
    /// A consistency check that should never fail did.
    InternalInvariant,
    /// Correct pixels cannot be produced; the current fill must be aborted.
    Fatal,
}

#[derive(Debug, Error)]
pub enum HalftoneError {
    #[error("Out of memory allocating {what} ({requested} elements)")]
    OutOfMemory { what: &'static str, requested: usize },

    #[error("Buffer too small: need {required} bytes, have {available}")]
    BufferTooSmall { required: usize, available: usize },

    #[error("Malformed halftone record at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Internal invariant violated: {0}")]
    Invariant(String),

    #[error("Tile render failed: {0}")]
    RenderFailed(String),

    #[error("Screen error: {0}")]
    Screen(#[from] ScreenError),
}

impl HalftoneError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HalftoneError::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            HalftoneError::BufferTooSmall { .. }
            | HalftoneError::Malformed { .. }
            | HalftoneError::InvalidOrder(_)
            | HalftoneError::Screen(_) => ErrorKind::RangeCheck,
            HalftoneError::Invariant(_) => ErrorKind::InternalInvariant,
            HalftoneError::RenderFailed(_) => ErrorKind::Fatal,
        }
    }

    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        HalftoneError::Malformed {
            offset,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HalftoneError>;

/// Errors from writing rendered tiles and threshold arrays to image files.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Unsupported dimensions: {width}x{height}")]
    UnsupportedDimensions { width: u32, height: u32 },

    #[error("PNG encode error: {0}")]
    PngEncode(String),

    #[error("Halftone error: {0}")]
    Halftone(#[from] HalftoneError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
