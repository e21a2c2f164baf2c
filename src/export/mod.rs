//! Recording export
//!
//! Post-processing of finished recordings and saving them to disk.

pub mod download;
pub mod seekable;

pub use download::{recording_file_name, DiskSaver, FileSaver, SavedRecording};
pub use seekable::{make_seekable, read_duration, ContainerError};
