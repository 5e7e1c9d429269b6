//! The served file volume: path resolution, the fork triple convention and
//! the filesystem capability trait.

pub mod forks;
pub mod paths;
pub mod store;

pub use self::paths::{resolve, PathError};
pub use self::store::{FileStore, OsFileStore};

/// Leaf marker making a folder a drop box: writable by uploaders, listable
/// only with the ViewDropBoxes permission.
pub const DROP_BOX_MARKER: &str = "Drop Box";
/// Name of the folder uploads are confined to by default.
pub const UPLOADS_FOLDER: &str = "Uploads";

/// True when the name denotes a drop box.
pub fn is_drop_box(name: &str) -> bool {
    name.contains(DROP_BOX_MARKER)
}

/// Unless the caller may upload anywhere, the target must be the uploads
/// folder, inside it, or inside a drop box.
pub fn upload_allowed(segments: &[Vec<u8>]) -> bool {
    segments.iter().any(|segment| {
        let name = hotline::macroman::to_utf8(segment);
        name == UPLOADS_FOLDER || is_drop_box(&name)
    })
}
