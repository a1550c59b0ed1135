//! JNI layer - native methods for the JVM canvas host
//!
//! `dev.jawtcanvas.NativeCanvas` exposes the backend directly:
//! - `static native long create(java.awt.Component component)`
//! - `static native void render(long renderContext)`
//! - `static native void resize(long renderContext, int width, int height)`
//! - `static native void destroy(long renderContext)`
//!
//! `dev.jawtcanvas.CanvasBinding` keeps the lifecycle logic native. `bind`
//! returns an id; the canvas forwards its listener callbacks
//! (`attached`, `shown`, `resized`, `moved`, `paint`, `hidden`, `detached`)
//! with that id and calls `close` once. `handle` reports the live context.
//!
//! `dev.jawtcanvas.NativeBridge` declares `add(int, int)` (load smoke test)
//! and `loadBackend(String, String)` (extract and load a companion library).
//!
//! Handles and ids are slotmap keys; `0` means none. Nothing here panics
//! across the boundary: failures are logged and turned into `0`/`false`.

use std::ffi::c_void;
use std::path::Path;

use jni::objects::{JClass, JObject, JString};
use jni::sys::{jboolean, jint, jlong, JNI_FALSE, JNI_TRUE, JNI_VERSION_1_8};
use jni::{JNIEnv, JavaVM};
use log::{debug, error};

use crate::backend::RenderBackend;
use crate::binding::RenderBinding;
use crate::event::CanvasEvent;
use crate::handle::RenderHandle;
use crate::jvm::{clear_exception, system_property, BindingTable, JniComponent, SurfaceFactory};
use crate::library::{LibraryError, LibraryLoader, NATIVE_LIBRARY};
use crate::platform::ResourcePrefix;
use crate::registry::ContextRegistry;

/// A canvas binding as owned by the JVM
pub type CanvasBinding = RenderBinding<JniComponent, &'static ContextRegistry<SurfaceFactory>>;

lazy_static::lazy_static! {
    /// Every context handed out to the JVM
    static ref CONTEXTS: ContextRegistry<SurfaceFactory> = ContextRegistry::new(SurfaceFactory);

    /// Every canvas binding handed out to the JVM
    static ref BINDINGS: BindingTable<CanvasBinding> = BindingTable::new();
}

/// JNI_OnLoad - called once when the JVM loads this library
#[no_mangle]
pub extern "system" fn JNI_OnLoad(_vm: JavaVM, _reserved: *mut c_void) -> jint {
    crate::init_logging("warn");
    debug!("JNI_OnLoad() invoked successfully");
    JNI_VERSION_1_8
}

#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_NativeCanvas_create(
    mut env: JNIEnv,
    _class: JClass,
    target: JObject, /* java.awt.Component */
) -> jlong {
    match JniComponent::new(&mut env, &target) {
        Ok(component) => CONTEXTS.create(&component).raw(),
        Err(e) => {
            error!("NativeCanvas.create(): {}", e);
            RenderHandle::NONE.raw()
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_NativeCanvas_render(
    _env: JNIEnv,
    _class: JClass,
    render_context: jlong,
) {
    RenderBackend::<JniComponent>::render(&*CONTEXTS, RenderHandle::from_raw(render_context));
}

#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_NativeCanvas_resize(
    _env: JNIEnv,
    _class: JClass,
    render_context: jlong,
    width: jint,
    height: jint,
) {
    RenderBackend::<JniComponent>::resize(&*CONTEXTS, RenderHandle::from_raw(render_context), width, height);
}

#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_NativeCanvas_destroy(
    _env: JNIEnv,
    _class: JClass,
    render_context: jlong,
) {
    RenderBackend::<JniComponent>::destroy(&*CONTEXTS, RenderHandle::from_raw(render_context));
}

/// Bind a component; returns the binding id, `0` on failure
#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_CanvasBinding_bind(
    mut env: JNIEnv,
    _class: JClass,
    target: JObject, /* java.awt.Component */
) -> jlong {
    match JniComponent::new(&mut env, &target) {
        Ok(component) => {
            let id = BINDINGS.insert(RenderBinding::new(component, &*CONTEXTS));
            debug!("CanvasBinding.bind() -> {:#x}", id);
            id
        }
        Err(e) => {
            error!("CanvasBinding.bind(): {}", e);
            0
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_CanvasBinding_attached(_env: JNIEnv, _class: JClass, binding: jlong) {
    dispatch(binding, CanvasEvent::Attached);
}

#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_CanvasBinding_shown(_env: JNIEnv, _class: JClass, binding: jlong) {
    dispatch(binding, CanvasEvent::Shown);
}

#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_CanvasBinding_resized(_env: JNIEnv, _class: JClass, binding: jlong) {
    dispatch(binding, CanvasEvent::Resized);
}

#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_CanvasBinding_moved(_env: JNIEnv, _class: JClass, binding: jlong) {
    dispatch(binding, CanvasEvent::Moved);
}

#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_CanvasBinding_paint(_env: JNIEnv, _class: JClass, binding: jlong) {
    dispatch(binding, CanvasEvent::Paint);
}

#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_CanvasBinding_hidden(_env: JNIEnv, _class: JClass, binding: jlong) {
    dispatch(binding, CanvasEvent::Hidden);
}

#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_CanvasBinding_detached(_env: JNIEnv, _class: JClass, binding: jlong) {
    dispatch(binding, CanvasEvent::Detached);
}

/// Destroy the live context and forget the id. Safe from any thread.
#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_CanvasBinding_close(_env: JNIEnv, _class: JClass, binding: jlong) {
    close(binding);
}

/// Current render handle of the binding, `0` if none
#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_CanvasBinding_handle(_env: JNIEnv, _class: JClass, binding: jlong) -> jlong {
    BINDINGS
        .get(binding)
        .map_or(RenderHandle::NONE, |binding| binding.handle())
        .raw()
}

fn dispatch(binding: jlong, event: CanvasEvent) {
    match BINDINGS.get(binding) {
        Some(binding) => binding.handle_event(event),
        None => debug!("CanvasBinding: ignoring {:?} for unknown binding {:#x}", event, binding),
    }
}

fn close(binding: jlong) {
    if let Some(binding) = BINDINGS.remove(binding) {
        binding.close();
    }
}

#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_NativeBridge_add(
    _env: JNIEnv,
    _class: JClass,
    lhs: jint,
    rhs: jint,
) -> jint {
    add(lhs, rhs)
}

fn add(lhs: jint, rhs: jint) -> jint {
    lhs.wrapping_add(rhs)
}

/// Extract `{resourceRoot}/{os}-{arch}/{name}` for the running JVM's platform
/// and load it with `System.load`. Only the first successful call loads.
#[no_mangle]
pub extern "system" fn Java_dev_jawtcanvas_NativeBridge_loadBackend(
    mut env: JNIEnv,
    _class: JClass,
    resource_root: JString,
    name: JString,
) -> jboolean {
    match load_backend(&mut env, &resource_root, &name) {
        Ok(()) => JNI_TRUE,
        Err(e) => {
            error!("NativeBridge.loadBackend(): {}", e);
            JNI_FALSE
        }
    }
}

fn load_backend(env: &mut JNIEnv, resource_root: &JString, name: &JString) -> Result<(), LibraryError> {
    let root: String = env.get_string(resource_root).map_err(load_error)?.into();
    let name: String = env.get_string(name).map_err(load_error)?.into();

    let os_name = system_property(env, "os.name").map_err(load_error)?;
    let os_arch = system_property(env, "os.arch").map_err(load_error)?;
    let prefix = ResourcePrefix::from_jvm(&os_name, &os_arch)?;

    let loader = JvmLoader::new(env.get_java_vm().map_err(load_error)?);
    NATIVE_LIBRARY.load_once(&loader, Path::new(&root), prefix, &name)?;
    Ok(())
}

/// Loads libraries into the JVM through `java.lang.System.load`
pub struct JvmLoader {
    vm: JavaVM,
}

impl JvmLoader {
    pub fn new(vm: JavaVM) -> Self {
        Self { vm }
    }
}

impl LibraryLoader for JvmLoader {
    fn load(&self, path: &Path) -> Result<(), LibraryError> {
        let mut env = self.vm.attach_current_thread().map_err(load_error)?;
        let result = (|| -> jni::errors::Result<()> {
            let system_class = env.find_class("java/lang/System")?;
            let path = env.new_string(path.to_string_lossy())?;
            env.call_static_method(system_class, "load", "(Ljava/lang/String;)V", &[(&path).into()])?;
            Ok(())
        })();
        result.map_err(|e| {
            clear_exception(&mut env);
            load_error(e)
        })
    }
}

fn load_error(e: jni::errors::Error) -> LibraryError {
    LibraryError::Load(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_wraps() {
        assert_eq!(add(5, 4), 9);
        assert_eq!(add(i32::MAX, 1), i32::MIN);
    }

    #[test]
    fn test_unknown_handles_are_ignored() {
        let forged = RenderHandle::from_raw(0x0000_0001_0000_0001);

        RenderBackend::<JniComponent>::render(&*CONTEXTS, forged);
        RenderBackend::<JniComponent>::resize(&*CONTEXTS, forged, 640, 480);
        RenderBackend::<JniComponent>::destroy(&*CONTEXTS, forged);
        RenderBackend::<JniComponent>::destroy(&*CONTEXTS, RenderHandle::NONE);

        assert!(CONTEXTS.is_empty());
        assert!(!CONTEXTS.contains(forged));
    }

    #[test]
    fn test_unknown_binding_ids_are_ignored() {
        dispatch(0, CanvasEvent::Shown);
        dispatch(0x0000_0001_0000_0001, CanvasEvent::Paint);
        close(0);
        close(0x0000_0001_0000_0001);

        assert!(BINDINGS.is_empty());
    }
}
