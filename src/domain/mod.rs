pub mod error;
pub mod model;

pub use error::{AppError, ResolverError, TransferError, ValidationError};
pub use model::{
    DownloadPhase, DownloadRequest, DownloadTarget, QualityMap, SelectedLink, TransferState,
};
