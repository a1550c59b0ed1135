//! Seams between the binding and its two collaborators
//!
//! - [`HostComponent`]: the visible surface that emits lifecycle events
//! - [`RenderBackend`]: the native library, addressed only by handle
//!
//! Backend calls are synchronous foreign calls. A backend that cannot
//! allocate a context reports it by returning [`RenderHandle::NONE`].

use std::sync::Arc;

use crate::event::Size;
use crate::handle::RenderHandle;

/// Host GUI component that owns the native surface
pub trait HostComponent {
    /// Current component geometry
    fn size(&self) -> Size;

    /// Ask the host to schedule a paint
    fn request_repaint(&self);
}

/// Native render backend
///
/// `C` is whatever the backend needs to bind a context to the component
/// (a JNI object, a window handle, a description of the surface).
pub trait RenderBackend<C: ?Sized> {
    /// Create a context bound to `component`. Returns `NONE` on failure.
    fn create(&self, component: &C) -> RenderHandle;

    /// Present a frame. No-op for `NONE` or unknown handles.
    fn render(&self, handle: RenderHandle);

    /// Update backend geometry. No-op for `NONE` or unknown handles.
    fn resize(&self, handle: RenderHandle, width: i32, height: i32);

    /// Release the context. Destroying `NONE` is a no-op.
    fn destroy(&self, handle: RenderHandle);
}

impl<C: ?Sized, B: RenderBackend<C> + ?Sized> RenderBackend<C> for &B {
    fn create(&self, component: &C) -> RenderHandle {
        (**self).create(component)
    }

    fn render(&self, handle: RenderHandle) {
        (**self).render(handle)
    }

    fn resize(&self, handle: RenderHandle, width: i32, height: i32) {
        (**self).resize(handle, width, height)
    }

    fn destroy(&self, handle: RenderHandle) {
        (**self).destroy(handle)
    }
}

impl<C: ?Sized, B: RenderBackend<C> + ?Sized> RenderBackend<C> for Arc<B> {
    fn create(&self, component: &C) -> RenderHandle {
        (**self).create(component)
    }

    fn render(&self, handle: RenderHandle) {
        (**self).render(handle)
    }

    fn resize(&self, handle: RenderHandle, width: i32, height: i32) {
        (**self).resize(handle, width, height)
    }

    fn destroy(&self, handle: RenderHandle) {
        (**self).destroy(handle)
    }
}

/// A bare geometry snapshot acts as a component that never repaints
impl HostComponent for Size {
    fn size(&self) -> Size {
        *self
    }

    fn request_repaint(&self) {}
}

impl<H: HostComponent + ?Sized> HostComponent for &H {
    fn size(&self) -> Size {
        (**self).size()
    }

    fn request_repaint(&self) {
        (**self).request_repaint()
    }
}

impl<H: HostComponent + ?Sized> HostComponent for Arc<H> {
    fn size(&self) -> Size {
        (**self).size()
    }

    fn request_repaint(&self) {
        (**self).request_repaint()
    }
}
