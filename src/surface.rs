//! AWT drawing surfaces (JAWT)
//!
//! A context is only created once the component's drawing surface has been
//! acquired from the JVM's AWT native interface, locked, and its surface
//! info read (bounds, clip rectangles, what changed since the last lock).
//! Each step is undone in reverse when its guard drops: the info is freed,
//! the surface unlocked, the surface freed.
//!
//! `JAWT_GetAWT` is resolved at runtime from the JVM's own `jawt` library,
//! so nothing here links against a JDK.

use std::error::Error;
use std::ffi::{c_char, c_void};
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::slice;

use bitflags::bitflags;
use jni::sys::{self, jboolean, jint, jobject, JNI_FALSE};
use log::debug;

use crate::event::Size;
use crate::platform::Os;
use crate::registry::ContextError;

pub const AWT_VERSION_1_4: jint = 0x0001_0004;
pub const AWT_VERSION_1_7: jint = 0x0001_0007;
pub const AWT_VERSION_9: jint = 0x0009_0000;

/// Tried newest first
const AWT_VERSIONS: [jint; 3] = [AWT_VERSION_9, AWT_VERSION_1_7, AWT_VERSION_1_4];

/// macOS only accepts pre-1.7 requests with the CALayer model flag set
const MACOSX_USE_CALAYER: jint = 0x8000_0000_u32 as jint;

const LOCK_ERROR: jint = 0x1;

const GET_AWT_SYMBOL: &[u8] = b"JAWT_GetAWT\0";

pub type GetAwtFn = unsafe extern "system" fn(env: *mut sys::JNIEnv, awt: *mut RawAwt) -> jboolean;
type FreeSurfaceFn = unsafe extern "system" fn(ds: *mut RawDrawingSurface);
type UnlockFn = unsafe extern "system" fn(ds: *mut RawDrawingSurface);
type FreeInfoFn = unsafe extern "system" fn(dsi: *mut RawSurfaceInfo);

/// `JAWT_Rectangle`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: jint,
    pub y: jint,
    pub width: jint,
    pub height: jint,
}

impl Rect {
    pub const fn new(x: jint, y: jint, width: jint, height: jint) -> Self {
        Self { x, y, width, height }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// `JAWT`: the AWT function table filled in by `JAWT_GetAWT`
#[repr(C)]
pub struct RawAwt {
    pub version: jint,
    pub get_drawing_surface:
        Option<unsafe extern "system" fn(env: *mut sys::JNIEnv, target: jobject) -> *mut RawDrawingSurface>,
    pub free_drawing_surface: Option<FreeSurfaceFn>,
    pub lock: Option<unsafe extern "system" fn(env: *mut sys::JNIEnv)>,
    pub unlock: Option<unsafe extern "system" fn(env: *mut sys::JNIEnv)>,
    pub get_component: Option<unsafe extern "system" fn(env: *mut sys::JNIEnv, platform_info: *mut c_void) -> jobject>,
    pub create_embedded_frame:
        Option<unsafe extern "system" fn(env: *mut sys::JNIEnv, platform_info: *mut c_void) -> jobject>,
    pub set_bounds: Option<
        unsafe extern "system" fn(env: *mut sys::JNIEnv, frame: jobject, x: jint, y: jint, width: jint, height: jint),
    >,
    pub synthesize_window_activation:
        Option<unsafe extern "system" fn(env: *mut sys::JNIEnv, frame: jobject, activate: jboolean)>,
}

impl RawAwt {
    /// An empty table asking for `version`
    pub fn request(version: jint) -> Self {
        Self {
            version,
            get_drawing_surface: None,
            free_drawing_surface: None,
            lock: None,
            unlock: None,
            get_component: None,
            create_embedded_frame: None,
            set_bounds: None,
            synthesize_window_activation: None,
        }
    }
}

/// `JAWT_DrawingSurface`
#[repr(C)]
pub struct RawDrawingSurface {
    pub env: *mut sys::JNIEnv,
    pub target: jobject,
    pub lock: Option<unsafe extern "system" fn(ds: *mut RawDrawingSurface) -> jint>,
    pub get_drawing_surface_info: Option<unsafe extern "system" fn(ds: *mut RawDrawingSurface) -> *mut RawSurfaceInfo>,
    pub free_drawing_surface_info: Option<FreeInfoFn>,
    pub unlock: Option<UnlockFn>,
}

/// `JAWT_DrawingSurfaceInfo`
#[repr(C)]
pub struct RawSurfaceInfo {
    pub platform_info: *mut c_void,
    pub ds: *mut RawDrawingSurface,
    pub bounds: Rect,
    pub clip_size: jint,
    pub clip: *mut Rect,
}

bitflags! {
    /// What changed since the surface was last locked
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SurfaceChanges: jint {
        const CLIP = 0x2;
        const BOUNDS = 0x4;
        const SURFACE = 0x8;
    }
}

/// Drawing surface errors
#[derive(Debug)]
pub enum SurfaceError {
    /// The JVM's `jawt` library or its entry point could not be resolved
    Library(String),
    /// AWT rejected every requested interface version
    UnsupportedVersion,
    /// The function table handed back by AWT has an empty slot
    MissingFunction(&'static str),
    /// The component has no heavyweight peer to draw on
    NoDrawingSurface,
    LockFailed,
    NoSurfaceInfo,
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::Library(msg) => write!(f, "AWT native interface unavailable: {}", msg),
            SurfaceError::UnsupportedVersion => write!(f, "no supported AWT native interface version"),
            SurfaceError::MissingFunction(name) => write!(f, "AWT function {} is not available", name),
            SurfaceError::NoDrawingSurface => write!(f, "component has no drawing surface"),
            SurfaceError::LockFailed => write!(f, "drawing surface could not be locked"),
            SurfaceError::NoSurfaceInfo => write!(f, "drawing surface has no surface info"),
        }
    }
}

impl Error for SurfaceError {}

impl From<SurfaceError> for ContextError {
    fn from(e: SurfaceError) -> Self {
        match e {
            SurfaceError::NoDrawingSurface | SurfaceError::LockFailed | SurfaceError::NoSurfaceInfo => {
                ContextError::SurfaceUnavailable(e.to_string())
            }
            SurfaceError::Library(_) | SurfaceError::UnsupportedVersion | SurfaceError::MissingFunction(_) => {
                ContextError::Host(e.to_string())
            }
        }
    }
}

/// Negotiated AWT native interface
pub struct Awt {
    raw: RawAwt,
}

impl Awt {
    /// Ask `get_awt` for the newest interface version it accepts.
    ///
    /// # Safety
    ///
    /// `get_awt` must be `JAWT_GetAWT` (or behave like it) and `env` must be
    /// the JNI environment of the calling thread.
    pub unsafe fn negotiate(get_awt: GetAwtFn, env: *mut sys::JNIEnv) -> Result<Self, SurfaceError> {
        for version in AWT_VERSIONS {
            let mut raw = RawAwt::request(requested_version(version));
            if unsafe { get_awt(env, &mut raw) } != JNI_FALSE {
                debug!("Awt: using interface version {:#x}", version);
                return Ok(Self { raw });
            }
            debug!("Awt: interface version {:#x} rejected", version);
        }
        Err(SurfaceError::UnsupportedVersion)
    }

    pub fn version(&self) -> jint {
        self.raw.version & !MACOSX_USE_CALAYER
    }

    /// Acquire the drawing surface of `target`, a `java.awt.Component`.
    ///
    /// # Safety
    ///
    /// `env` must be the calling thread's JNI environment and `target` a live
    /// reference. The returned surface must stay on this thread.
    pub unsafe fn drawing_surface(&self, env: *mut sys::JNIEnv, target: jobject) -> Result<DrawingSurface, SurfaceError> {
        let get = self
            .raw
            .get_drawing_surface
            .ok_or(SurfaceError::MissingFunction("GetDrawingSurface"))?;
        let free = self
            .raw
            .free_drawing_surface
            .ok_or(SurfaceError::MissingFunction("FreeDrawingSurface"))?;

        let raw = NonNull::new(unsafe { get(env, target) }).ok_or(SurfaceError::NoDrawingSurface)?;
        Ok(unsafe { DrawingSurface::from_raw_parts(raw, free) })
    }
}

fn requested_version(version: jint) -> jint {
    if cfg!(target_os = "macos") && version < AWT_VERSION_1_7 {
        version | MACOSX_USE_CALAYER
    } else {
        version
    }
}

/// A component's drawing surface; freed on drop
pub struct DrawingSurface {
    raw: NonNull<RawDrawingSurface>,
    free: FreeSurfaceFn,
}

impl DrawingSurface {
    /// # Safety
    ///
    /// `raw` must come from `GetDrawingSurface` and `free` must be the
    /// matching `FreeDrawingSurface`.
    pub unsafe fn from_raw_parts(raw: NonNull<RawDrawingSurface>, free: FreeSurfaceFn) -> Self {
        Self { raw, free }
    }

    fn raw(&self) -> &RawDrawingSurface {
        unsafe { self.raw.as_ref() }
    }

    /// Lock the surface for native rendering. The returned guard unlocks it.
    pub fn lock(&mut self) -> Result<(SurfaceChanges, SurfaceLock<'_>), SurfaceError> {
        let lock = self
            .raw()
            .lock
            .ok_or(SurfaceError::MissingFunction("DrawingSurface.Lock"))?;
        // Resolved up front so a taken lock can always be released
        let unlock = self
            .raw()
            .unlock
            .ok_or(SurfaceError::MissingFunction("DrawingSurface.Unlock"))?;

        let result = unsafe { lock(self.raw.as_ptr()) };
        if result & LOCK_ERROR != 0 {
            return Err(SurfaceError::LockFailed);
        }

        Ok((
            SurfaceChanges::from_bits_truncate(result),
            SurfaceLock { surface: self, unlock },
        ))
    }

    /// Lock, copy out the surface info, unlock
    pub fn snapshot(&mut self) -> Result<SurfaceSnapshot, SurfaceError> {
        let (changes, mut lock) = self.lock()?;
        let info = lock.info()?;

        let snapshot = SurfaceSnapshot {
            bounds: info.bounds(),
            clip: info.clip().to_vec(),
            changes,
            has_platform_info: !info.platform_info().is_null(),
        };
        Ok(snapshot)
    }
}

impl Drop for DrawingSurface {
    fn drop(&mut self) {
        unsafe { (self.free)(self.raw.as_ptr()) };
    }
}

/// A held surface lock; unlocks on drop
pub struct SurfaceLock<'a> {
    surface: &'a mut DrawingSurface,
    unlock: UnlockFn,
}

impl SurfaceLock<'_> {
    pub fn info(&mut self) -> Result<SurfaceInfo<'_>, SurfaceError> {
        let raw = self.surface.raw();
        let get = raw
            .get_drawing_surface_info
            .ok_or(SurfaceError::MissingFunction("DrawingSurface.GetDrawingSurfaceInfo"))?;
        let free = raw
            .free_drawing_surface_info
            .ok_or(SurfaceError::MissingFunction("DrawingSurface.FreeDrawingSurfaceInfo"))?;

        let info = NonNull::new(unsafe { get(self.surface.raw.as_ptr()) }).ok_or(SurfaceError::NoSurfaceInfo)?;
        Ok(SurfaceInfo {
            raw: info,
            free,
            _lock: PhantomData,
        })
    }
}

impl Drop for SurfaceLock<'_> {
    fn drop(&mut self) {
        unsafe { (self.unlock)(self.surface.raw.as_ptr()) };
    }
}

/// Surface info of a locked surface; freed on drop
pub struct SurfaceInfo<'a> {
    raw: NonNull<RawSurfaceInfo>,
    free: FreeInfoFn,
    _lock: PhantomData<&'a mut ()>,
}

impl SurfaceInfo<'_> {
    fn raw(&self) -> &RawSurfaceInfo {
        unsafe { self.raw.as_ref() }
    }

    pub fn bounds(&self) -> Rect {
        self.raw().bounds
    }

    pub fn clip(&self) -> &[Rect] {
        let raw = self.raw();
        match usize::try_from(raw.clip_size) {
            Ok(len) if len > 0 && !raw.clip.is_null() => unsafe { slice::from_raw_parts(raw.clip, len) },
            _ => &[],
        }
    }

    /// `HWND`-, X11- or `NSView`-layer info depending on the platform.
    /// Not interpreted here.
    pub fn platform_info(&self) -> *mut c_void {
        self.raw().platform_info
    }
}

impl Drop for SurfaceInfo<'_> {
    fn drop(&mut self) {
        unsafe { (self.free)(self.raw.as_ptr()) };
    }
}

/// Owned copy of what a locked surface reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSnapshot {
    pub bounds: Rect,
    pub clip: Vec<Rect>,
    pub changes: SurfaceChanges,
    pub has_platform_info: bool,
}

/// Where a JVM keeps its `jawt` library
pub fn jawt_library_path(os: Os, java_home: &Path) -> PathBuf {
    let dir = match os {
        Os::Win32 => "bin",
        Os::Darwin | Os::Linux => "lib",
    };
    java_home.join(dir).join(os.map_library_name("jawt"))
}

/// Resolve `JAWT_GetAWT` from the library at `path`. The library is never
/// unloaded; the AWT function table points into it.
pub fn load_get_awt(path: &Path) -> Result<GetAwtFn, SurfaceError> {
    let symbol = open_symbol(path)?;
    if symbol.is_null() {
        return Err(SurfaceError::Library(format!(
            "JAWT_GetAWT not found in {}",
            path.display()
        )));
    }
    debug!("Awt: resolved JAWT_GetAWT from {}", path.display());
    Ok(unsafe { std::mem::transmute::<*mut c_void, GetAwtFn>(symbol) })
}

#[cfg(unix)]
fn open_symbol(path: &Path) -> Result<*mut c_void, SurfaceError> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| SurfaceError::Library(format!("invalid path {}", path.display())))?;

    let library = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW) };
    if library.is_null() {
        return Err(SurfaceError::Library(format!("could not open {}", path.display())));
    }
    Ok(unsafe { libc::dlsym(library, GET_AWT_SYMBOL.as_ptr().cast::<c_char>()) })
}

#[cfg(windows)]
#[link(name = "kernel32")]
extern "system" {
    fn LoadLibraryW(file_name: *const u16) -> *mut c_void;
    fn GetProcAddress(module: *mut c_void, proc_name: *const c_char) -> *mut c_void;
}

#[cfg(windows)]
fn open_symbol(path: &Path) -> Result<*mut c_void, SurfaceError> {
    use std::os::windows::ffi::OsStrExt;

    let wide: Vec<u16> = path.as_os_str().encode_wide().chain(std::iter::once(0)).collect();
    let library = unsafe { LoadLibraryW(wide.as_ptr()) };
    if library.is_null() {
        return Err(SurfaceError::Library(format!("could not open {}", path.display())));
    }
    Ok(unsafe { GetProcAddress(library, GET_AWT_SYMBOL.as_ptr().cast::<c_char>()) })
}

#[cfg(not(any(unix, windows)))]
fn open_symbol(path: &Path) -> Result<*mut c_void, SurfaceError> {
    Err(SurfaceError::Library(format!(
        "no dynamic loader to open {}",
        path.display()
    )))
}
