use std::fs::Permissions;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;

use camino::Utf8Path;
use tempfile::Builder;

/// Replaces `path` with `contents` so readers never observe a partial write.
///
/// Data is fsync'd in a sibling temporary file which is then renamed into
/// place.
pub(super) fn atomic_write(path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "target path did not have a parent directory",
        )
    })?;
    let mut file = Builder::new()
        .prefix(path.file_name().unwrap_or("pytables"))
        .permissions(Permissions::from_mode(0o600))
        .tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
