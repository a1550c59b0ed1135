//! Native context registry
//!
//! The backend half of the handle contract. Contexts live in a SlotMap and
//! the handle handed across the boundary is the slot key encoded as an
//! `i64`. Removing the slot ends the context's lifetime, so a stale or
//! forged handle can never reach freed memory; it just misses the lookup.
//!
//! Performance considerations:
//! - One mutex around the map; calls arrive serially from the host's
//!   event-dispatch thread in practice
//! - O(1) lookups by key

use std::error::Error;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error};
use slotmap::{new_key_type, Key, KeyData, SlotMap};

use crate::backend::{HostComponent, RenderBackend};
use crate::handle::RenderHandle;

new_key_type! {
    /// Registry slot for one native render context
    pub struct ContextKey;
}

impl ContextKey {
    /// Encode for the boundary. Occupied keys always carry an odd version,
    /// so the encoding is never zero.
    pub fn to_handle(self) -> RenderHandle {
        RenderHandle::from_raw(self.data().as_ffi() as i64)
    }

    pub fn from_handle(handle: RenderHandle) -> Option<Self> {
        handle
            .live()
            .map(|handle| KeyData::from_ffi(handle.raw() as u64).into())
    }
}

/// Context creation errors
#[derive(Debug)]
pub enum ContextError {
    /// The component has no native surface to render into (not displayable,
    /// no drawing surface, lock or surface info refused)
    SurfaceUnavailable(String),
    /// Querying the host about the component failed
    Host(String),
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::SurfaceUnavailable(msg) => write!(f, "Surface unavailable: {}", msg),
            ContextError::Host(msg) => write!(f, "Host query failed: {}", msg),
        }
    }
}

impl Error for ContextError {}

/// A live native rendering context
pub trait RenderContext: Send {
    /// Present one frame
    fn render(&mut self);

    /// Reconfigure for a new surface size
    fn resize(&mut self, width: u32, height: u32);

    /// Current surface size
    fn size(&self) -> (u32, u32);
}

/// Builds contexts for components of type `C`
pub trait ContextFactory<C: ?Sized> {
    fn create_context(&self, component: &C) -> Result<Box<dyn RenderContext>, ContextError>;
}

/// Handle-addressed arena of native contexts
pub struct ContextRegistry<F> {
    factory: F,
    contexts: Mutex<SlotMap<ContextKey, Box<dyn RenderContext>>>,
}

impl<F> ContextRegistry<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            contexts: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Number of live contexts
    pub fn len(&self) -> usize {
        self.contexts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts().is_empty()
    }

    pub fn contains(&self, handle: RenderHandle) -> bool {
        ContextKey::from_handle(handle).is_some_and(|key| self.contexts().contains_key(key))
    }

    /// Run `f` against the context behind `handle`, if it is live
    pub fn inspect<R>(&self, handle: RenderHandle, f: impl FnOnce(&dyn RenderContext) -> R) -> Option<R> {
        let key = ContextKey::from_handle(handle)?;
        let contexts = self.contexts();
        contexts.get(key).map(|context| f(context.as_ref()))
    }

    fn contexts(&self) -> MutexGuard<'_, SlotMap<ContextKey, Box<dyn RenderContext>>> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_context(&self, handle: RenderHandle, f: impl FnOnce(&mut dyn RenderContext)) {
        let Some(key) = ContextKey::from_handle(handle) else {
            return;
        };
        let mut contexts = self.contexts();
        match contexts.get_mut(key) {
            Some(context) => f(context.as_mut()),
            None => debug!("ContextRegistry: ignoring unknown handle {}", handle),
        }
    }
}

impl<C: ?Sized, F: ContextFactory<C>> RenderBackend<C> for ContextRegistry<F> {
    fn create(&self, component: &C) -> RenderHandle {
        match self.factory.create_context(component) {
            Ok(context) => {
                let handle = self.contexts().insert(context).to_handle();
                debug!("ContextRegistry::create() -> {}", handle);
                handle
            }
            Err(e) => {
                error!("ContextRegistry::create() failed: {}", e);
                RenderHandle::NONE
            }
        }
    }

    fn render(&self, handle: RenderHandle) {
        self.with_context(handle, |context| context.render());
    }

    fn resize(&self, handle: RenderHandle, width: i32, height: i32) {
        let width = u32::try_from(width).unwrap_or_default();
        let height = u32::try_from(height).unwrap_or_default();
        self.with_context(handle, |context| {
            if context.size() != (width, height) {
                context.resize(width, height);
            }
        });
    }

    fn destroy(&self, handle: RenderHandle) {
        let Some(key) = ContextKey::from_handle(handle) else {
            return;
        };
        // Drop the context outside the lock
        let removed = self.contexts().remove(key);
        if removed.is_some() {
            debug!("ContextRegistry::destroy({})", handle);
        }
    }
}

/// Harness context: tracks geometry and counts presented frames
#[derive(Debug, Default)]
pub struct FrameCounter {
    width: u32,
    height: u32,
    frames: u64,
}

impl FrameCounter {
    pub fn new(width: u32, height: u32) -> Self {
        debug!("FrameCounter::new(): width = {width}, height = {height}");
        Self {
            width,
            height,
            frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl RenderContext for FrameCounter {
    fn render(&mut self) {
        if self.width == 0 || self.height == 0 {
            debug!("FrameCounter::render(): surface has no area, skipping");
            return;
        }
        self.frames += 1;
        debug!("FrameCounter::render(): frame {}", self.frames);
    }

    fn resize(&mut self, width: u32, height: u32) {
        debug!("FrameCounter::resize({width}, {height})");
        self.width = width;
        self.height = height;
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Creates a [`FrameCounter`] sized to the component
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCounterFactory;

impl<C: HostComponent + ?Sized> ContextFactory<C> for FrameCounterFactory {
    fn create_context(&self, component: &C) -> Result<Box<dyn RenderContext>, ContextError> {
        let (width, height) = component.size().clamped();
        Ok(Box::new(FrameCounter::new(width, height)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Size;

    struct FailingFactory;

    impl ContextFactory<Size> for FailingFactory {
        fn create_context(&self, _component: &Size) -> Result<Box<dyn RenderContext>, ContextError> {
            Err(ContextError::SurfaceUnavailable("component is not displayable".into()))
        }
    }

    fn registry() -> ContextRegistry<FrameCounterFactory> {
        ContextRegistry::new(FrameCounterFactory)
    }

    #[test]
    fn test_create_returns_live_handles() {
        let registry = registry();
        let first = registry.create(&Size::new(300, 300));
        let second = registry.create(&Size::new(10, 10));

        assert!(first.is_live());
        assert!(second.is_live());
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.inspect(first, |context| context.size()), Some((300, 300)));
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let registry = registry();
        let handle = registry.create(&Size::new(1, 1));

        RenderBackend::<Size>::destroy(&registry, handle);
        RenderBackend::<Size>::destroy(&registry, handle);
        RenderBackend::<Size>::destroy(&registry, RenderHandle::NONE);

        assert!(registry.is_empty());
        assert!(!registry.contains(handle));
    }

    #[test]
    fn test_stale_handle_misses_reused_slot() {
        let registry = registry();
        let stale = registry.create(&Size::new(1, 1));
        RenderBackend::<Size>::destroy(&registry, stale);

        let fresh = registry.create(&Size::new(2, 2));
        assert_ne!(stale, fresh);

        RenderBackend::<Size>::resize(&registry, stale, 50, 50);
        RenderBackend::<Size>::destroy(&registry, stale);
        assert!(registry.contains(fresh));
        assert_eq!(registry.inspect(fresh, |context| context.size()), Some((2, 2)));
    }

    #[test]
    fn test_resize_clamps_negative_sizes() {
        let registry = registry();
        let handle = registry.create(&Size::new(5, 5));

        RenderBackend::<Size>::resize(&registry, handle, -3, 40);
        assert_eq!(registry.inspect(handle, |context| context.size()), Some((0, 40)));
    }

    #[test]
    fn test_zero_handle_is_ignored() {
        let registry = registry();
        RenderBackend::<Size>::render(&registry, RenderHandle::NONE);
        RenderBackend::<Size>::resize(&registry, RenderHandle::NONE, 1, 1);
        assert!(ContextKey::from_handle(RenderHandle::NONE).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_factory_failure_returns_none() {
        let registry = ContextRegistry::new(FailingFactory);
        let handle = registry.create(&Size::new(10, 10));
        assert_eq!(handle, RenderHandle::NONE);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_frame_counter_skips_empty_surface() {
        let mut counter = FrameCounter::new(0, 0);
        counter.render();
        assert_eq!(counter.frames(), 0);

        counter.resize(300, 300);
        counter.render();
        counter.render();
        assert_eq!(counter.frames(), 2);
        assert_eq!(counter.size(), (300, 300));
    }

    #[test]
    fn test_context_error_display() {
        let err = ContextError::Host("getWidth threw".into());
        assert_eq!(err.to_string(), "Host query failed: getWidth threw");
    }
}
