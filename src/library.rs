//! Native library extraction and once-per-process loading
//!
//! The library ships as a resource at `{root}/{os}-{arch}/{mapped name}`.
//! Before the first foreign call it is copied to a temp file carrying the
//! platform suffix and handed to a [`LibraryLoader`] exactly once.

use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

use log::{debug, info};
use tempfile::TempPath;

use crate::platform::{PlatformError, ResourcePrefix};

/// Library resolution and loading errors. All of them are fatal at startup.
#[derive(Debug)]
pub enum LibraryError {
    /// Running on a platform without a packaged library
    Platform(PlatformError),
    /// No library resource for this platform
    Missing(PathBuf),
    /// Reading the resource or writing the temp file failed
    Io { path: PathBuf, source: io::Error },
    /// The loader rejected the extracted file
    Load(String),
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryError::Platform(e) => write!(f, "{}", e),
            LibraryError::Missing(path) => write!(f, "native library not found: {}", path.display()),
            LibraryError::Io { path, source } => {
                write!(f, "could not extract {}: {}", path.display(), source)
            }
            LibraryError::Load(msg) => write!(f, "could not load native library: {}", msg),
        }
    }
}

impl Error for LibraryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LibraryError::Platform(e) => Some(e),
            LibraryError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<PlatformError> for LibraryError {
    fn from(e: PlatformError) -> Self {
        LibraryError::Platform(e)
    }
}

/// Location of the packaged library for `prefix`
pub fn resource_path(root: &Path, prefix: ResourcePrefix, name: &str) -> PathBuf {
    root.join(prefix.to_string()).join(prefix.os.map_library_name(name))
}

/// A library copied out of the resource tree. The file is removed on drop.
#[derive(Debug)]
pub struct ExtractedLibrary {
    path: TempPath,
}

impl ExtractedLibrary {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Copy the packaged library for `prefix` into a fresh temp file
pub fn extract_library(
    root: &Path,
    prefix: ResourcePrefix,
    name: &str,
) -> Result<ExtractedLibrary, LibraryError> {
    let source = resource_path(root, prefix, name);
    if !source.is_file() {
        return Err(LibraryError::Missing(source));
    }

    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| LibraryError::Io { path, source }
    };

    let mut input = File::open(&source).map_err(io_error(&source))?;
    let mut temp = tempfile::Builder::new()
        .prefix(name)
        .suffix(prefix.os.library_suffix())
        .tempfile()
        .map_err(io_error(&source))?;
    let copied = io::copy(&mut input, temp.as_file_mut()).map_err(io_error(&source))?;

    debug!("extracted {} ({} bytes) to {}", source.display(), copied, temp.path().display());

    Ok(ExtractedLibrary {
        path: temp.into_temp_path(),
    })
}

/// Loads an extracted library into the running process
pub trait LibraryLoader {
    fn load(&self, path: &Path) -> Result<(), LibraryError>;

    /// Past-tense verb for the log line once `load` succeeds
    fn outcome(&self) -> &'static str {
        "loaded"
    }
}

/// Checks that the extracted file is a readable, non-empty file without
/// mapping it. Used where no host runtime is present to load into.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCheckLoader;

impl LibraryLoader for FileCheckLoader {
    fn load(&self, path: &Path) -> Result<(), LibraryError> {
        let metadata = std::fs::metadata(path).map_err(|source| LibraryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if metadata.len() == 0 {
            return Err(LibraryError::Load(format!("{} is empty", path.display())));
        }
        Ok(())
    }

    fn outcome(&self) -> &'static str {
        "staged"
    }
}

/// A library that has been extracted and loaded
#[derive(Debug)]
pub struct NativeLibrary {
    prefix: ResourcePrefix,
    // Kept alive so the file stays on disk while it is mapped
    file: ExtractedLibrary,
}

impl NativeLibrary {
    pub fn prefix(&self) -> ResourcePrefix {
        self.prefix
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Once-only load guard
pub struct LibraryCell {
    loaded: OnceLock<NativeLibrary>,
    init: Mutex<()>,
}

impl LibraryCell {
    pub const fn new() -> Self {
        Self {
            loaded: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub fn get(&self) -> Option<&NativeLibrary> {
        self.loaded.get()
    }

    /// Extract and load the library on first call; later calls return the
    /// library loaded the first time without touching the loader.
    pub fn load_once(
        &self,
        loader: &dyn LibraryLoader,
        root: &Path,
        prefix: ResourcePrefix,
        name: &str,
    ) -> Result<&NativeLibrary, LibraryError> {
        if let Some(library) = self.loaded.get() {
            return Ok(library);
        }

        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(library) = self.loaded.get() {
            return Ok(library);
        }

        let file = extract_library(root, prefix, name)?;
        loader.load(file.path())?;
        info!("{} native library {} for {}", loader.outcome(), name, prefix);

        Ok(self.loaded.get_or_init(|| NativeLibrary { prefix, file }))
    }
}

impl Default for LibraryCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide library state
pub static NATIVE_LIBRARY: LibraryCell = LibraryCell::new();
