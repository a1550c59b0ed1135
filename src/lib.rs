//! JAWT Canvas - native render contexts bound to a JVM canvas lifecycle
//!
//! This library is loaded into a JVM process and drives a native rendering
//! context for an AWT canvas. The host component reports lifecycle events
//! (attached, shown, resized, hidden, ...); a [`RenderBinding`] turns them
//! into create/render/resize/destroy calls while keeping at most one live
//! context per component. Contexts are only created for components whose
//! AWT drawing surface can be locked.

// Core modules
pub mod backend;
pub mod binding;
pub mod config;
pub mod event;
pub mod ffi;
pub mod handle;
pub mod harness;
pub mod jvm;
pub mod library;
pub mod platform;
pub mod registry;
pub mod surface;

// Re-exports for convenience
pub use backend::{HostComponent, RenderBackend};
pub use binding::{BindingState, RenderBinding};
pub use config::CanvasConfig;
pub use event::{CanvasEvent, Size};
pub use handle::RenderHandle;
pub use registry::{ContextRegistry, FrameCounterFactory};
pub use surface::{SurfaceError, SurfaceSnapshot};

/// Install the `env_logger` backend for the `log` facade.
///
/// `RUST_LOG` takes precedence over `default_filter`. Does nothing if a
/// logger is already installed.
pub fn init_logging(default_filter: &str) {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let _ = env_logger::Builder::from_env(env).try_init();
}
