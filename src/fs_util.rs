use std::fs;
use std::io;
use std::path::Path;

use tracing::trace;

/// Remove `path` and everything below it, then recreate it empty.
///
/// An absent `path` is fine; it is simply created.
pub fn clear_folder(path: &Path) -> io::Result<()> {
    remove_path(path)?;
    fs::create_dir_all(path)?;
    trace!(path = %path.display(), "cleared folder");
    Ok(())
}

/// Whether `base_dir/name` (or `base_dir` itself when `name` is `None`)
/// exists as a directory. Symlinks to directories count.
pub fn has_opt_module(base_dir: &Path, name: Option<&str>) -> bool {
    match name {
        Some(name) => base_dir.join(name).is_dir(),
        None => base_dir.is_dir(),
    }
}

/// Remove whatever sits at `path` without following symlinks.
///
/// A symlink is unlinked, a directory is removed recursively and anything
/// else is removed as a file. Nothing at `path` is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };

    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Create a symlink at `link` pointing to `source`.
#[cfg(unix)]
pub fn link_path(source: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, link)?;
    trace!(source = %source.display(), link = %link.display(), "linked");
    Ok(())
}

#[cfg(windows)]
pub fn link_path(source: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(source, link)?;
    trace!(source = %source.display(), link = %link.display(), "linked");
    Ok(())
}
