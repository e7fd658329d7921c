use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Write `data` to `path` atomically: temp file in the same directory -> fsync -> rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    write_atomic_with(path, |file| file.write_all(data))
}

/// Like [`write_atomic`], but lets the caller stream into the temp file.
///
/// The temp file is removed if `write` fails, leaving `path` untouched.
pub fn write_atomic_with<F, E>(path: &Path, write: F) -> Result<(), E>
where
    F: FnOnce(&mut std::fs::File) -> Result<(), E>,
    E: From<io::Error>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    write(temp.as_file_mut())?;
    temp.as_file_mut().flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| E::from(e.error))?;

    Ok(())
}
