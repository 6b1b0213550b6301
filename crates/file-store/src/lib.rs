//! File storage under a single root directory.
//!
//! Maps protocol paths (`/dir/name`) to files below the root, stages
//! uploads in a temp file next to their destination and publishes them
//! with an atomic rename, so a final file name never refers to partial
//! content.
//!
//! # Layout
//!
//! ```text
//! <root>/<dir>/<name>            final file
//! <root>/<dir>/<stem>.tmp        upload in progress (reserved name)
//! <root>/<dir>/<stem>.tmb.png    derived thumbnail
//! ```

mod error;
mod files;
mod locks;
mod resolve;
mod staged;

pub use error::StoreError;
pub use files::{delete, read_whole};
pub use locks::{StagingGuard, StagingLocks};
pub use resolve::{FileStore, validate_request_path};
pub use staged::{StagedFile, begin_write, write_atomic};

use std::path::{Path, PathBuf};

/// Extension of a staged (in-flight) file.
pub const STAGED_EXTENSION: &str = "tmp";

/// Suffix appended to the file stem to name a thumbnail.
pub const THUMBNAIL_SUFFIX: &str = ".tmb.png";

/// Returns the staging path for `final_path`: `<dir>/<stem>.tmp`.
pub fn staged_path(final_path: &Path) -> PathBuf {
    sibling_with_stem(final_path, &format!(".{STAGED_EXTENSION}"))
}

/// Whether `path` carries the staging extension.
///
/// Such names are reserved for uploads in progress and never published.
pub fn is_staged_name(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == STAGED_EXTENSION)
}

/// Returns the thumbnail path for `source`: `<dir>/<stem>.tmb.png`.
pub fn thumbnail_path(source: &Path) -> PathBuf {
    sibling_with_stem(source, THUMBNAIL_SUFFIX)
}

/// Builds `<dir>/<stem><suffix>`, where stem is the name minus its last
/// extension.
fn sibling_with_stem(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!("{stem}{suffix}");
    match path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}
