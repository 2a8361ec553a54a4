use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;

/// Replaces `path` with `contents` so readers never see a partial file.
///
/// The parent directory is created when missing. Data is synced before the
/// temporary file is renamed over the target.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "report path has no parent directory",
        )
    })?;
    fs::create_dir_all(directory)?;

    let prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("roster");
    let mut file = Builder::new().prefix(prefix).tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
