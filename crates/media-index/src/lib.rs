//! Media library indexing for the web viewer
//!
//! Ties the scanner, content hasher, duration prober, artifact generator and
//! ratings store into one [`Library`] whose in-memory index answers list
//! queries and absorbs rating and play-count mutations.

pub mod config;
pub mod entry;
pub mod error;
pub mod filter;
pub mod index;
pub mod library;
pub mod scanner;

pub use config::{LibraryConfig, METADATA_DIR_NAME, MINUS_DIR_NAME};
pub use entry::{format_duration, MediaEntry, MediaView, ScanSnapshot};
pub use error::{LibraryError, LibraryResult};
pub use filter::{ListQuery, PlayCountFilter, RatingFilter};
pub use index::MediaIndex;
pub use library::{Library, MoveReport};
pub use scanner::{DirectoryScanner, ScannedFile};
