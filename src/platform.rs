//! Platform detection for native library packaging
//!
//! Native binaries are shipped as resources under `{os}-{arch}/`, e.g.
//! `linux-x86-64/libjawt_canvas.so`. The tag can be derived either from the
//! JVM's `os.name`/`os.arch` system properties or from the Rust target.

use std::error::Error;
use std::fmt;

/// Operating systems with a packaged native library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Darwin,
    Linux,
    Win32,
}

/// CPU architectures with a packaged native library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
}

/// Unsupported platform errors. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    UnsupportedOs(String),
    UnsupportedArch(String),
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::UnsupportedOs(name) => write!(f, "unsupported OS: {}", name),
            PlatformError::UnsupportedArch(name) => write!(f, "unknown arch: {}", name),
        }
    }
}

impl Error for PlatformError {}

impl Os {
    /// Parse the JVM `os.name` property
    pub fn from_jvm_name(name: &str) -> Result<Self, PlatformError> {
        match name {
            "Mac OS X" => Ok(Os::Darwin),
            "Linux" => Ok(Os::Linux),
            name if name.starts_with("Win") => Ok(Os::Win32),
            _ => Err(PlatformError::UnsupportedOs(name.to_string())),
        }
    }

    /// Parse a Rust `target_os` value (`std::env::consts::OS`)
    pub fn from_target(name: &str) -> Result<Self, PlatformError> {
        match name {
            "macos" => Ok(Os::Darwin),
            "linux" => Ok(Os::Linux),
            "windows" => Ok(Os::Win32),
            _ => Err(PlatformError::UnsupportedOs(name.to_string())),
        }
    }

    pub fn current() -> Result<Self, PlatformError> {
        Self::from_target(std::env::consts::OS)
    }

    pub fn tag(self) -> &'static str {
        match self {
            Os::Darwin => "darwin",
            Os::Linux => "linux",
            Os::Win32 => "win32",
        }
    }

    /// File name of a shared library on this OS (`System.mapLibraryName`)
    pub fn map_library_name(self, name: &str) -> String {
        match self {
            Os::Darwin => format!("lib{}.dylib", name),
            Os::Linux => format!("lib{}.so", name),
            Os::Win32 => format!("{}.dll", name),
        }
    }

    /// Extension given to the extracted temp file
    pub fn library_suffix(self) -> &'static str {
        match self {
            Os::Darwin => ".dylib",
            Os::Linux => ".so",
            Os::Win32 => ".dll",
        }
    }
}

impl Arch {
    /// Parse the JVM `os.arch` property
    pub fn from_jvm_name(name: &str) -> Result<Self, PlatformError> {
        match name {
            "x86_64" | "amd64" => Ok(Arch::X86_64),
            "aarch64" => Ok(Arch::Aarch64),
            _ => Err(PlatformError::UnsupportedArch(name.to_string())),
        }
    }

    /// Parse a Rust `target_arch` value (`std::env::consts::ARCH`)
    pub fn from_target(name: &str) -> Result<Self, PlatformError> {
        match name {
            "x86_64" => Ok(Arch::X86_64),
            "aarch64" => Ok(Arch::Aarch64),
            _ => Err(PlatformError::UnsupportedArch(name.to_string())),
        }
    }

    pub fn current() -> Result<Self, PlatformError> {
        Self::from_target(std::env::consts::ARCH)
    }

    pub fn tag(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86-64",
            Arch::Aarch64 => "aarch64",
        }
    }
}

/// `{os}-{arch}` resource directory for one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourcePrefix {
    pub os: Os,
    pub arch: Arch,
}

impl ResourcePrefix {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// From JVM `os.name` and `os.arch`
    pub fn from_jvm(os_name: &str, os_arch: &str) -> Result<Self, PlatformError> {
        Ok(Self::new(Os::from_jvm_name(os_name)?, Arch::from_jvm_name(os_arch)?))
    }

    /// The platform this binary was compiled for
    pub fn current() -> Result<Self, PlatformError> {
        Ok(Self::new(Os::current()?, Arch::current()?))
    }
}

impl fmt::Display for ResourcePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.tag(), self.arch.tag())
    }
}
