pub mod object_store;
pub mod spool;

pub use object_store::{HttpObjectStore, MemoryObjectStore, ObjectStore};
pub use spool::{Spool, SpooledFile};

use parley_types::models::MessageKind;

/// Errors from the upload pipeline, split by the step that failed: no
/// message row may exist for either case.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("transient spool I/O failed: {0}")]
    Spool(#[from] std::io::Error),

    #[error("durable upload failed: {0}")]
    Upload(String),
}

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];
const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "flv"];

/// Classify an upload by file-name extension. Anything outside the two
/// allow-lists is a generic file.
pub fn classify_file_name(name: &str) -> MessageKind {
    let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        MessageKind::Image
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        MessageKind::Video
    } else {
        MessageKind::File
    }
}
