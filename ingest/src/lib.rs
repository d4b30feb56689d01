//! Unpacking of uploaded benchmark archives.

pub mod archive;
pub mod error;

pub use archive::{has_zip_extension, BenchArchive, Submission, REQUIRED_ENTRIES};
pub use error::ArchiveError;
