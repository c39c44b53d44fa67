use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// `path` with `suffix` appended to its final component, e.g. `out.txt` -> `out.txt.tmp`.
pub fn with_suffix<T: AsRef<Path>>(path: T, suffix: &str) -> PathBuf {
    let mut s = path.as_ref().as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Create a directory and all its parents, succeeding if it already exists.
pub fn makedirs<T: AsRef<Path>>(path: T) -> io::Result<()> {
    fs::create_dir_all(path)
}

/// Create the parent directory of `path`, if it has one.
pub fn make_parent_dirs<T: AsRef<Path>>(path: T) -> io::Result<()> {
    match path.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Modification time of `path`, or `None` if it can't be read.
pub fn mtime<T: AsRef<Path>>(path: T) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Create `path` if it doesn't exist, then set its modification time to now.
/// Existing contents are left alone.
pub fn touch<T: AsRef<Path>>(path: T) -> io::Result<()> {
    set_mtime(path, SystemTime::now())
}

/// Create `path` if it doesn't exist, then set its modification time to `time`.
pub fn set_mtime<T: AsRef<Path>>(path: T, time: SystemTime) -> io::Result<()> {
    let path = path.as_ref();
    make_parent_dirs(path)?;
    let f = OpenOptions::new().create(true).append(true).open(path)?;
    f.set_modified(time)
}

/// Copy the modification time of `src` onto `tgt`, creating `tgt` if necessary.
pub fn copy_mtime<T: AsRef<Path>, U: AsRef<Path>>(src: T, tgt: U) -> io::Result<()> {
    let modified = fs::metadata(src)?.modified()?;
    set_mtime(tgt, modified)
}
