pub mod extraction;
pub mod file_handle;
pub mod mime;
pub mod upload_item;

pub use extraction::{ExtractedFields, ExtractionRecord, ExtractionResponse};
pub use file_handle::FileHandle;
pub use upload_item::{ItemId, ItemReport, PreviewUrl, UploadItem, UploadStatus};
