use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// The temporary companion used by crash-safe writes: `<datafile>~`.
pub(crate) fn temp_companion(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("~");
    PathBuf::from(name)
}

/// The containing directory, `"."` for bare filenames.
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Open and fsync a file or directory.
///
/// Some platforms cannot fsync a directory; those failures are swallowed, a
/// documented durability weakness limited to the very first creation of the
/// datafile.
pub(crate) fn flush_to_storage(path: &Path, is_dir: bool) -> io::Result<()> {
    let opened = if is_dir {
        File::open(path)
    } else {
        OpenOptions::new().read(true).write(true).open(path)
    };
    let file = match opened {
        Ok(file) => file,
        Err(_) if is_dir => return Ok(()),
        Err(e) => return Err(e),
    };
    match file.sync_all() {
        Err(_) if is_dir => Ok(()),
        result => result,
    }
}

/// Write a file so that a crash at any point leaves either the previous
/// version or the new one, never a truncated mix.
///
/// Sequence: fsync the parent directory, fsync the current file if it
/// exists, write and fsync `<file>~`, rename it over the file, fsync the
/// parent directory again. The rename is atomic on POSIX.
pub(crate) fn crash_safe_write_file(path: &Path, data: &str) -> io::Result<()> {
    let parent = parent_dir(path);
    let temp = temp_companion(path);

    flush_to_storage(&parent, true)?;
    if path.exists() {
        flush_to_storage(path, false)?;
    }
    let mut file = File::create(&temp)?;
    file.write_all(data.as_bytes())?;
    file.sync_all()?;
    drop(file);
    fs::rename(&temp, path)?;
    flush_to_storage(&parent, true)?;
    Ok(())
}

/// Make sure the datafile exists and is in a coherent state.
///
/// If the file is there, nothing to do. If only the `~` companion exists, a
/// previous crash-safe write died between its fsync and the rename — the
/// companion holds a complete new version, so promote it. Otherwise create
/// an empty datafile.
pub(crate) fn ensure_datafile_integrity(path: &Path) -> io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    let temp = temp_companion(path);
    if temp.exists() {
        return fs::rename(&temp, path);
    }
    fs::write(path, "")
}

/// Append data to the datafile with a single write, then fsync.
pub(crate) fn append_to_file(path: &Path, data: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(data.as_bytes())?;
    file.sync_all()?;
    Ok(())
}
