//! Manual test harness support
//!
//! A scripted host component, a backend wrapper that records every foreign
//! call, and a replay loop that feeds a script of lifecycle events through a
//! [`RenderBinding`]. Used by the `canvas-harness` binary and by tests.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::backend::{HostComponent, RenderBackend};
use crate::binding::RenderBinding;
use crate::event::{CanvasEvent, Size};
use crate::handle::RenderHandle;

/// One foreign call observed at the backend boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCall {
    /// `create()` and the handle it returned
    Create(RenderHandle),
    Render(RenderHandle),
    Resize(RenderHandle, i32, i32),
    Destroy(RenderHandle),
}

impl fmt::Display for BackendCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendCall::Create(handle) => write!(f, "create() -> {}", handle),
            BackendCall::Render(handle) => write!(f, "render({})", handle),
            BackendCall::Resize(handle, width, height) => {
                write!(f, "resize({}, {}, {})", handle, width, height)
            }
            BackendCall::Destroy(handle) => write!(f, "destroy({})", handle),
        }
    }
}

/// Wraps a backend and records every call before forwarding it
pub struct TracingBackend<B> {
    inner: B,
    calls: Mutex<Vec<BackendCall>>,
}

impl<B> TracingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Snapshot of all calls so far, in order
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().clone()
    }

    /// Drain the recorded calls
    pub fn take_calls(&self) -> Vec<BackendCall> {
        std::mem::take(&mut *self.lock())
    }

    /// Non-zero handles returned by `create`, in order
    pub fn created(&self) -> Vec<RenderHandle> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Create(handle) => handle.live(),
                _ => None,
            })
            .collect()
    }

    /// Non-zero handles passed to `destroy`, in order
    pub fn destroyed(&self) -> Vec<RenderHandle> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Destroy(handle) => handle.live(),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall) {
        log::debug!("backend call: {}", call);
        self.lock().push(call);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<BackendCall>> {
        // A poisoned trace is still a valid trace
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<C: ?Sized, B: RenderBackend<C>> RenderBackend<C> for TracingBackend<B> {
    fn create(&self, component: &C) -> RenderHandle {
        let handle = self.inner.create(component);
        self.record(BackendCall::Create(handle));
        handle
    }

    fn render(&self, handle: RenderHandle) {
        self.record(BackendCall::Render(handle));
        self.inner.render(handle);
    }

    fn resize(&self, handle: RenderHandle, width: i32, height: i32) {
        self.record(BackendCall::Resize(handle, width, height));
        self.inner.resize(handle, width, height);
    }

    fn destroy(&self, handle: RenderHandle) {
        self.record(BackendCall::Destroy(handle));
        self.inner.destroy(handle);
    }
}

/// Host component whose geometry is set by the script
pub struct ScriptedHost {
    size: Mutex<Size>,
    repaints: AtomicUsize,
}

impl ScriptedHost {
    pub fn new(size: Size) -> Self {
        Self {
            size: Mutex::new(size),
            repaints: AtomicUsize::new(0),
        }
    }

    pub fn set_size(&self, size: Size) {
        *self.size.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = size;
    }

    /// Number of repaint requests received so far
    pub fn repaint_requests(&self) -> usize {
        self.repaints.load(Ordering::SeqCst)
    }
}

impl HostComponent for ScriptedHost {
    fn size(&self) -> Size {
        *self.size.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn request_repaint(&self) {
        self.repaints.fetch_add(1, Ordering::SeqCst);
    }
}

/// One step of an event script
///
/// When `width`/`height` are present the host takes that geometry before the
/// event is delivered, e.g. `{ event = "resized", width = 300, height = 300 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub event: CanvasEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
}

impl ScriptStep {
    pub fn new(event: CanvasEvent) -> Self {
        Self {
            event,
            width: None,
            height: None,
        }
    }

    pub fn with_size(event: CanvasEvent, width: i32, height: i32) -> Self {
        Self {
            event,
            width: Some(width),
            height: Some(height),
        }
    }
}

/// Feed `steps` through `binding` in order
pub fn replay<'a, B>(binding: &RenderBinding<&'a ScriptedHost, B>, steps: &[ScriptStep])
where
    B: RenderBackend<&'a ScriptedHost>,
{
    let host: &ScriptedHost = binding.component();
    for step in steps {
        if step.width.is_some() || step.height.is_some() {
            let current = host.size();
            host.set_size(Size::new(
                step.width.unwrap_or(current.width),
                step.height.unwrap_or(current.height),
            ));
        }
        binding.handle_event(step.event);
    }
}
