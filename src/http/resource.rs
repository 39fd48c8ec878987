//! Document root and resolution of request paths beneath it

use crate::errors::ErrorKind;
use std::{
    ffi::CString,
    fs::File,
    io,
    os::unix::io::{AsRawFd, FromRawFd, RawFd},
    path::{Path, PathBuf},
};

const INDEX_FILE: &str = "index.html";
const ERROR_PAGE: &str = "error.html";

/// Directory every request path is resolved against.
///
/// The directory is opened once; all lookups go through `openat` on that
/// descriptor, so renaming or replacing the root path after startup does not
/// change what is served.
#[derive(Debug)]
pub struct DocumentRoot {
    dir: File,
    path: PathBuf,
}

/// An opened file ready to be transferred.
#[derive(Debug)]
pub struct Resource {
    pub file: File,
    pub size: u64,
    /// Set when a directory was requested and its `index.html` substituted.
    pub index: bool,
}

impl DocumentRoot {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let dir = File::open(path)?;

        if !dir.metadata()?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", path.display()),
            ));
        }

        Ok(Self {
            dir,
            path: path.to_path_buf(),
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the file named by an absolute request path.
    ///
    /// `/` is the root itself; a directory resolves to its `index.html`.
    /// Paths containing a `..` segment are never opened.
    pub fn resolve(&self, path: &[u8]) -> Result<Resource, ErrorKind> {
        let path = simdutf8::basic::from_utf8(path).map_err(|_| ErrorKind::InvalidUrl)?;

        if path.split('/').any(|segment| segment == "..") {
            tracing::warn!(path, "refusing path outside the document root");
            return Err(ErrorKind::NotFound);
        }

        let relative = match path.trim_start_matches('/') {
            "" => ".",
            relative => relative,
        };

        let file = open_at(self.dir.as_raw_fd(), relative).map_err(|_| ErrorKind::NotFound)?;
        let meta = file.metadata()?;

        if meta.is_dir() {
            let index = open_at(file.as_raw_fd(), INDEX_FILE).map_err(|_| ErrorKind::NotFound)?;
            return Resource::regular(index, true);
        }

        Resource::regular(file, false)
    }

    /// `error.html` under the root, if there is one.
    pub fn error_page(&self) -> Option<Resource> {
        let file = open_at(self.dir.as_raw_fd(), ERROR_PAGE).ok()?;
        Resource::regular(file, false).ok()
    }
}

impl Resource {
    fn regular(file: File, index: bool) -> Result<Self, ErrorKind> {
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(ErrorKind::NotFound);
        }

        Ok(Self {
            file,
            size: meta.len(),
            index,
        })
    }
}

fn open_at(dir: RawFd, relative: &str) -> io::Result<File> {
    let relative =
        CString::new(relative).map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

    // FIFOs and some devices block in open(2) without O_NONBLOCK. Regular
    // file reads ignore the flag.
    let flags = libc::O_RDONLY | libc::O_CLOEXEC | libc::O_NONBLOCK;

    // SAFETY: `relative` is NUL terminated and outlives the call.
    let fd = unsafe { libc::openat(dir, relative.as_ptr(), flags) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: `fd` was just returned by `openat` and is owned by nobody else.
    Ok(unsafe { File::from_raw_fd(fd) })
}
