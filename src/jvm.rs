//! JVM side of the binding
//!
//! - [`JniComponent`]: a `java.awt.Component` pinned by a global reference.
//!   Geometry queries and repaint requests go through JNI on whichever
//!   thread asks.
//! - [`SurfaceFactory`]: builds a context from the component's locked AWT
//!   drawing surface.
//! - [`BindingTable`]: per-canvas bindings handed to the JVM as opaque ids.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use jni::objects::{GlobalRef, JObject, JString};
use jni::sys::jlong;
use jni::{JNIEnv, JavaVM};
use log::{debug, error};
use slotmap::{new_key_type, Key, KeyData, SlotMap};

use crate::backend::HostComponent;
use crate::event::Size;
use crate::platform::Os;
use crate::registry::{ContextError, ContextFactory, FrameCounter, RenderContext};
use crate::surface::{self, Awt, SurfaceError};

/// AWT native interface, negotiated on first use
static AWT: OnceLock<Awt> = OnceLock::new();

/// A host component living in the JVM
pub struct JniComponent {
    vm: JavaVM,
    target: GlobalRef,
}

impl JniComponent {
    /// Pin `target` for use from any thread. Fails for `null`.
    pub fn new(env: &mut JNIEnv, target: &JObject) -> Result<Self, ContextError> {
        if target.is_null() {
            return Err(ContextError::SurfaceUnavailable("component is null".into()));
        }
        let vm = env.get_java_vm().map_err(host_error)?;
        let target = env.new_global_ref(target).map_err(host_error)?;
        Ok(Self { vm, target })
    }

    /// Run `f` attached to the current thread. A failed call leaves no
    /// pending exception behind.
    fn with_env<R>(
        &self,
        f: impl FnOnce(&mut JNIEnv, &JObject) -> jni::errors::Result<R>,
    ) -> jni::errors::Result<R> {
        let mut guard = self.vm.attach_current_thread()?;
        let env: &mut JNIEnv = &mut guard;
        let result = f(&mut *env, self.target.as_obj());
        if result.is_err() {
            clear_exception(env);
        }
        result
    }
}

impl HostComponent for JniComponent {
    fn size(&self) -> Size {
        let size = self.with_env(|env, target| {
            let width = env.call_method(target, "getWidth", "()I", &[])?.i()?;
            let height = env.call_method(target, "getHeight", "()I", &[])?.i()?;
            Ok(Size::new(width, height))
        });
        size.unwrap_or_else(|e| {
            error!("JniComponent::size(): {}", e);
            Size::default()
        })
    }

    fn request_repaint(&self) {
        let result = self.with_env(|env, target| {
            env.call_method(target, "repaint", "()V", &[])?;
            Ok(())
        });
        if let Err(e) = result {
            error!("JniComponent::request_repaint(): {}", e);
        }
    }
}

/// Builds a [`FrameCounter`] sized to the component's drawing surface
#[derive(Debug, Clone, Copy, Default)]
pub struct SurfaceFactory;

impl ContextFactory<JniComponent> for SurfaceFactory {
    fn create_context(&self, component: &JniComponent) -> Result<Box<dyn RenderContext>, ContextError> {
        let mut guard = component.vm.attach_current_thread().map_err(host_error)?;
        let env: &mut JNIEnv = &mut guard;
        let target = component.target.as_obj();

        match env.call_method(target, "isDisplayable", "()Z", &[]).and_then(|value| value.z()) {
            Ok(true) => {}
            Ok(false) => {
                return Err(ContextError::SurfaceUnavailable("component has no native peer".into()));
            }
            Err(e) => {
                clear_exception(env);
                return Err(host_error(e));
            }
        }

        let awt = awt(env)?;
        let mut drawing_surface = unsafe { awt.drawing_surface(env.get_raw(), target.as_raw()) }?;
        let snapshot = drawing_surface.snapshot()?;
        debug!(
            "SurfaceFactory: bounds = {:?}, {} clip rects, changes = {:?}",
            snapshot.bounds,
            snapshot.clip.len(),
            snapshot.changes
        );

        let (width, height) = snapshot.bounds.size().clamped();
        Ok(Box::new(FrameCounter::new(width, height)))
    }
}

fn awt(env: &mut JNIEnv) -> Result<&'static Awt, SurfaceError> {
    if let Some(awt) = AWT.get() {
        return Ok(awt);
    }

    let java_home = system_property(env, "java.home").map_err(|e| {
        clear_exception(env);
        SurfaceError::Library(e.to_string())
    })?;
    let os = Os::current().map_err(|e| SurfaceError::Library(e.to_string()))?;
    let get_awt = surface::load_get_awt(&surface::jawt_library_path(os, Path::new(&java_home)))?;

    let awt = unsafe { Awt::negotiate(get_awt, env.get_raw()) }?;
    Ok(AWT.get_or_init(|| awt))
}

/// `System.getProperty(key)`
pub(crate) fn system_property(env: &mut JNIEnv, key: &str) -> jni::errors::Result<String> {
    let key = env.new_string(key)?;
    let value = env
        .call_static_method(
            "java/lang/System",
            "getProperty",
            "(Ljava/lang/String;)Ljava/lang/String;",
            &[(&key).into()],
        )?
        .l()?;
    let value = JString::from(value);
    let value: String = env.get_string(&value)?.into();
    Ok(value)
}

/// Leave no pending Java exception behind before the next JNI call
pub(crate) fn clear_exception(env: &mut JNIEnv) {
    if env.exception_check().unwrap_or(false) {
        let _ = env.exception_describe();
        let _ = env.exception_clear();
    }
}

fn host_error(e: jni::errors::Error) -> ContextError {
    ContextError::Host(e.to_string())
}

new_key_type! {
    /// Slot of one canvas binding
    pub struct BindingKey;
}

/// Bindings owned on behalf of the JVM, addressed by non-zero ids
pub struct BindingTable<T> {
    bindings: Mutex<SlotMap<BindingKey, Arc<T>>>,
}

impl<T> BindingTable<T> {
    pub fn new() -> Self {
        Self {
            bindings: Mutex::new(SlotMap::with_key()),
        }
    }

    pub fn insert(&self, binding: T) -> jlong {
        let key = self.bindings().insert(Arc::new(binding));
        key.data().as_ffi() as jlong
    }

    /// The binding behind `id`; `None` for `0`, stale or unknown ids
    pub fn get(&self, id: jlong) -> Option<Arc<T>> {
        let key = binding_key(id)?;
        self.bindings().get(key).cloned()
    }

    /// Take the binding out of the table. It drops once the last caller
    /// still holding it lets go.
    pub fn remove(&self, id: jlong) -> Option<Arc<T>> {
        let key = binding_key(id)?;
        self.bindings().remove(key)
    }

    pub fn len(&self) -> usize {
        self.bindings().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings().is_empty()
    }

    fn bindings(&self) -> MutexGuard<'_, SlotMap<BindingKey, Arc<T>>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for BindingTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn binding_key(id: jlong) -> Option<BindingKey> {
    if id == 0 {
        debug!("BindingTable: ignoring id 0");
        return None;
    }
    Some(KeyData::from_ffi(id as u64).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BindingState, RenderBinding};
    use crate::event::CanvasEvent;
    use crate::harness::TracingBackend;
    use crate::registry::{ContextRegistry, FrameCounterFactory};

    type TestBinding = RenderBinding<Size, Arc<TracingBackend<ContextRegistry<FrameCounterFactory>>>>;

    fn backend() -> Arc<TracingBackend<ContextRegistry<FrameCounterFactory>>> {
        Arc::new(TracingBackend::new(ContextRegistry::new(FrameCounterFactory)))
    }

    #[test]
    fn test_ids_are_never_zero() {
        let table: BindingTable<TestBinding> = BindingTable::new();
        let backend = backend();

        let first = table.insert(RenderBinding::new(Size::new(10, 10), Arc::clone(&backend)));
        let second = table.insert(RenderBinding::new(Size::new(20, 20), Arc::clone(&backend)));

        assert_ne!(first, 0);
        assert_ne!(second, 0);
        assert_ne!(first, second);
        assert_eq!(table.len(), 2);
        assert!(table.get(0).is_none());
    }

    #[test]
    fn test_binding_driven_through_table() {
        let table = BindingTable::new();
        let backend = backend();
        let id = table.insert(RenderBinding::new(Size::new(300, 300), Arc::clone(&backend)));

        let binding = table.get(id).unwrap();
        binding.handle_event(CanvasEvent::Shown);
        binding.handle_event(CanvasEvent::Paint);
        let handle = binding.handle();
        assert_eq!(binding.state(), BindingState::Live(handle));
        assert_eq!(backend.inner().len(), 1);
        drop(binding);

        // Removing the last reference closes the binding
        assert!(table.remove(id).is_some());
        assert!(backend.inner().is_empty());
        assert_eq!(backend.destroyed(), vec![handle]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_removed_id_is_stale() {
        let table = BindingTable::new();
        let backend = backend();
        let stale = table.insert(RenderBinding::new(Size::new(1, 1), Arc::clone(&backend)));
        table.remove(stale);

        let fresh = table.insert(RenderBinding::new(Size::new(2, 2), Arc::clone(&backend)));
        assert_ne!(stale, fresh);
        assert!(table.get(stale).is_none());
        assert!(table.remove(stale).is_none());
        assert_eq!(table.get(fresh).map(|binding| binding.component().width), Some(2));
    }

    #[test]
    fn test_close_while_binding_is_borrowed() {
        let table = BindingTable::new();
        let backend = backend();
        let id = table.insert(RenderBinding::new(Size::new(5, 5), Arc::clone(&backend)));

        let in_flight = table.get(id).unwrap();
        in_flight.on_shown();

        // Close takes the binding out and destroys its context even though
        // another caller still holds it
        let removed = table.remove(id).unwrap();
        removed.close();
        assert!(backend.inner().is_empty());

        in_flight.on_paint();
        drop(in_flight);
        drop(removed);
        assert_eq!(backend.created().len(), backend.destroyed().len());
    }
}
