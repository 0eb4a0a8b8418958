pub use extension::{is_archive_file, splitext, ARCHIVE_EXTENSIONS};
pub use tag::Tag;
pub use wheel::{WheelFilename, WheelFilenameError};

mod extension;
mod tag;
mod wheel;
