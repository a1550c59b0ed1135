//! Render-context binding
//!
//! Ties one native render context to a host component's lifecycle:
//! - attach/shown creates a context (destroying any stale one first)
//! - resize/move pushes geometry to the live context
//! - paint forwards to the backend's render
//! - hidden/detach/close destroys the live context
//!
//! The handle slot is an `AtomicI64`. Every read-and-replace goes through
//! `swap`, so a handle can only be taken out of the slot once and is
//! destroyed by whoever took it. This keeps an explicit close issued from a
//! shutdown thread from racing the event-dispatch thread into a double
//! destroy.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use log::{debug, warn};

use crate::backend::{HostComponent, RenderBackend};
use crate::event::{CanvasEvent, Transition};
use crate::handle::RenderHandle;

/// Observable state of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// No context; never attached, or hidden/detached/closed since
    Idle,
    /// A context is live
    Live(RenderHandle),
    /// The last attach asked for a context and the backend returned `NONE`.
    /// Cleared by the next attach or detach.
    CreateFailed,
}

/// Binds at most one live native render context to a host component
pub struct RenderBinding<H: HostComponent, B: RenderBackend<H>> {
    component: H,
    backend: B,
    slot: AtomicI64,
    create_failed: AtomicBool,
}

impl<H: HostComponent, B: RenderBackend<H>> RenderBinding<H, B> {
    pub fn new(component: H, backend: B) -> Self {
        Self {
            component,
            backend,
            slot: AtomicI64::new(RenderHandle::NONE.raw()),
            create_failed: AtomicBool::new(false),
        }
    }

    pub fn component(&self) -> &H {
        &self.component
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Currently stored handle (`NONE` if no context is live)
    pub fn handle(&self) -> RenderHandle {
        RenderHandle::from_raw(self.slot.load(Ordering::SeqCst))
    }

    pub fn state(&self) -> BindingState {
        let handle = self.handle();
        if handle.is_live() {
            BindingState::Live(handle)
        } else if self.create_failed.load(Ordering::SeqCst) {
            BindingState::CreateFailed
        } else {
            BindingState::Idle
        }
    }

    /// Dispatch a host event to the matching transition
    pub fn handle_event(&self, event: CanvasEvent) {
        debug!("RenderBinding::handle_event({:?})", event);

        match event.transition() {
            Transition::Attach => self.attach(),
            Transition::Resize => self.resize(),
            Transition::Paint => self.on_paint(),
            Transition::Detach => self.release(),
        }
    }

    pub fn on_attach(&self) {
        self.attach();
    }

    pub fn on_shown(&self) {
        self.attach();
    }

    pub fn on_resize(&self) {
        self.resize();
    }

    pub fn on_move(&self) {
        self.resize();
    }

    pub fn on_hidden(&self) {
        self.release();
    }

    pub fn on_detach(&self) {
        self.release();
    }

    pub fn on_paint(&self) {
        if let Some(handle) = self.handle().live() {
            self.backend.render(handle);
        }
    }

    /// Explicit shutdown. Safe to call from any thread, any number of times.
    pub fn close(&self) {
        self.release();
    }

    fn attach(&self) {
        // A live handle here means the host delivered shown twice or out of
        // order. It must go before the replacement is created.
        self.release();

        let fresh = self.backend.create(&self.component);
        if !fresh.is_live() {
            warn!("RenderBinding: backend could not create a render context");
            self.create_failed.store(true, Ordering::SeqCst);
            return;
        }

        debug!("RenderBinding: created context {}", fresh);

        let displaced = RenderHandle::from_raw(self.slot.swap(fresh.raw(), Ordering::SeqCst));
        if displaced.is_live() {
            debug!("RenderBinding: destroying displaced context {}", displaced);
            self.backend.destroy(displaced);
        }

        self.sync_geometry();
        self.component.request_repaint();
    }

    fn resize(&self) {
        self.sync_geometry();
        self.component.request_repaint();
    }

    fn sync_geometry(&self) {
        let Some(handle) = self.handle().live() else {
            return;
        };
        let size = self.component.size();
        self.backend.resize(handle, size.width, size.height);
    }

    fn release(&self) {
        self.create_failed.store(false, Ordering::SeqCst);

        let stale = RenderHandle::from_raw(self.slot.swap(RenderHandle::NONE.raw(), Ordering::SeqCst));
        if stale.is_live() {
            debug!("RenderBinding: destroying context {}", stale);
            self.backend.destroy(stale);
        }
    }
}

impl<H: HostComponent, B: RenderBackend<H>> Drop for RenderBinding<H, B> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Size;
    use crate::harness::{BackendCall, ScriptedHost, TracingBackend};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Hands out preset handles from `create`; everything else is a no-op
    struct SequenceBackend {
        handles: Mutex<VecDeque<i64>>,
    }

    impl SequenceBackend {
        fn new(handles: &[i64]) -> Self {
            Self {
                handles: Mutex::new(handles.iter().copied().collect()),
            }
        }
    }

    impl<C: ?Sized> RenderBackend<C> for SequenceBackend {
        fn create(&self, _component: &C) -> RenderHandle {
            let next = self.handles.lock().unwrap().pop_front().unwrap_or(0);
            RenderHandle::from_raw(next)
        }

        fn render(&self, _handle: RenderHandle) {}

        fn resize(&self, _handle: RenderHandle, _width: i32, _height: i32) {}

        fn destroy(&self, _handle: RenderHandle) {}
    }

    /// Like `SequenceBackend`, but the first `create` runs a hook before
    /// returning, so a second attach can land while the first is in flight
    struct ReentrantBackend {
        handles: Mutex<VecDeque<i64>>,
        hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl<C: ?Sized> RenderBackend<C> for ReentrantBackend {
        fn create(&self, _component: &C) -> RenderHandle {
            let next = self.handles.lock().unwrap().pop_front().unwrap_or(0);
            let hook = self.hook.lock().unwrap().take();
            if let Some(hook) = hook {
                hook();
            }
            RenderHandle::from_raw(next)
        }

        fn render(&self, _handle: RenderHandle) {}

        fn resize(&self, _handle: RenderHandle, _width: i32, _height: i32) {}

        fn destroy(&self, _handle: RenderHandle) {}
    }

    type TestBinding<'a> = RenderBinding<&'a ScriptedHost, Arc<TracingBackend<SequenceBackend>>>;

    fn binding<'a>(host: &'a ScriptedHost, handles: &[i64]) -> (TestBinding<'a>, Arc<TracingBackend<SequenceBackend>>) {
        let backend = Arc::new(TracingBackend::new(SequenceBackend::new(handles)));
        (RenderBinding::new(host, Arc::clone(&backend)), backend)
    }

    fn h(raw: i64) -> RenderHandle {
        RenderHandle::from_raw(raw)
    }

    #[test]
    fn test_shown_resize_shown_hidden() {
        let host = ScriptedHost::new(Size::new(0, 0));
        let (binding, backend) = binding(&host, &[1, 2]);

        binding.on_shown();
        host.set_size(Size::new(300, 300));
        binding.on_resize();
        binding.on_shown();
        binding.on_hidden();

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::Create(h(1)),
                BackendCall::Resize(h(1), 0, 0),
                BackendCall::Resize(h(1), 300, 300),
                BackendCall::Destroy(h(1)),
                BackendCall::Create(h(2)),
                BackendCall::Resize(h(2), 300, 300),
                BackendCall::Destroy(h(2)),
            ]
        );
        assert_eq!(binding.state(), BindingState::Idle);
    }

    #[test]
    fn test_resize_before_shown_is_ignored() {
        let host = ScriptedHost::new(Size::new(100, 100));
        let (binding, backend) = binding(&host, &[5]);

        binding.on_resize();
        assert!(backend.calls().is_empty());

        binding.on_shown();
        assert_eq!(
            backend.calls(),
            vec![BackendCall::Create(h(5)), BackendCall::Resize(h(5), 100, 100)]
        );
        assert_eq!(binding.state(), BindingState::Live(h(5)));
    }

    #[test]
    fn test_hidden_twice_is_noop() {
        let host = ScriptedHost::new(Size::new(10, 10));
        let (binding, backend) = binding(&host, &[7]);

        binding.on_shown();
        binding.on_hidden();
        let after_first = backend.calls();
        binding.on_hidden();

        assert_eq!(backend.calls(), after_first);
        assert_eq!(backend.destroyed(), vec![h(7)]);
    }

    #[test]
    fn test_hidden_without_context() {
        let host = ScriptedHost::new(Size::new(10, 10));
        let (binding, backend) = binding(&host, &[]);

        binding.on_detach();
        binding.close();
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_shown_twice_replaces_context() {
        let host = ScriptedHost::new(Size::new(10, 10));
        let (binding, backend) = binding(&host, &[1, 2]);

        binding.on_attach();
        binding.on_shown();

        let lifecycle: Vec<_> = backend
            .calls()
            .into_iter()
            .filter(|call| matches!(call, BackendCall::Create(_) | BackendCall::Destroy(_)))
            .collect();
        assert_eq!(
            lifecycle,
            vec![
                BackendCall::Create(h(1)),
                BackendCall::Destroy(h(1)),
                BackendCall::Create(h(2)),
            ]
        );
        assert_eq!(binding.handle(), h(2));
    }

    #[test]
    fn test_paint_forwards_live_handle() {
        let host = ScriptedHost::new(Size::new(10, 10));
        let (binding, backend) = binding(&host, &[3]);

        binding.on_paint();
        assert!(backend.calls().is_empty());

        binding.on_shown();
        binding.on_paint();
        assert_eq!(backend.calls().last(), Some(&BackendCall::Render(h(3))));
    }

    #[test]
    fn test_repaint_requested_after_attach_and_resize() {
        let host = ScriptedHost::new(Size::new(10, 10));
        let (binding, _backend) = binding(&host, &[3]);

        binding.on_shown();
        binding.on_move();
        assert_eq!(host.repaint_requests(), 2);
    }

    #[test]
    fn test_create_failure_is_distinguishable() {
        let host = ScriptedHost::new(Size::new(10, 10));
        let (binding, backend) = binding(&host, &[0, 9]);

        binding.on_shown();
        assert_eq!(binding.state(), BindingState::CreateFailed);
        assert_eq!(binding.handle(), RenderHandle::NONE);

        // Nothing reaches the backend while no context is live
        binding.on_resize();
        binding.on_paint();
        assert_eq!(backend.calls(), vec![BackendCall::Create(RenderHandle::NONE)]);

        // The next shown retries
        binding.on_shown();
        assert_eq!(binding.state(), BindingState::Live(h(9)));
    }

    #[test]
    fn test_drop_destroys_live_context() {
        let host = ScriptedHost::new(Size::new(10, 10));
        let backend = Arc::new(TracingBackend::new(SequenceBackend::new(&[4])));
        {
            let binding = RenderBinding::new(&host, Arc::clone(&backend));
            binding.on_shown();
        }
        assert_eq!(backend.destroyed(), vec![h(4)]);
    }

    #[test]
    fn test_close_after_hidden_does_not_double_destroy() {
        let host = ScriptedHost::new(Size::new(10, 10));
        let (binding, backend) = binding(&host, &[1]);

        binding.on_shown();
        binding.on_hidden();
        binding.close();
        drop(binding);

        assert_eq!(backend.destroyed(), vec![h(1)]);
    }

    #[test]
    fn test_every_created_handle_destroyed_once() {
        let host = ScriptedHost::new(Size::new(10, 10));
        let backend = Arc::new(TracingBackend::new(SequenceBackend::new(&[1, 2, 3, 4, 5, 6])));
        {
            let binding = RenderBinding::new(&host, Arc::clone(&backend));
            for event in [
                CanvasEvent::Hidden,
                CanvasEvent::Shown,
                CanvasEvent::Shown,
                CanvasEvent::Hidden,
                CanvasEvent::Hidden,
                CanvasEvent::Attached,
                CanvasEvent::Resized,
                CanvasEvent::Shown,
                CanvasEvent::Detached,
                CanvasEvent::Shown,
            ] {
                binding.handle_event(event);
            }
        }

        let mut created = backend.created();
        let mut destroyed = backend.destroyed();
        created.sort_by_key(|handle| handle.raw());
        destroyed.sort_by_key(|handle| handle.raw());
        assert_eq!(created, destroyed);
        assert_eq!(created.len(), 5);
    }

    #[test]
    fn test_racing_attach_destroys_displaced_context() {
        let host = Arc::new(ScriptedHost::new(Size::new(10, 10)));
        let backend = Arc::new(TracingBackend::new(ReentrantBackend {
            handles: Mutex::new(VecDeque::from([1, 2])),
            hook: Mutex::new(None),
        }));
        let binding = Arc::new(RenderBinding::new(Arc::clone(&host), Arc::clone(&backend)));

        // The outer attach takes handle 1; while its create is running a
        // second attach takes handle 2 and stores it first
        let racing = Arc::downgrade(&binding);
        *backend.inner().hook.lock().unwrap() = Some(Box::new(move || {
            if let Some(binding) = racing.upgrade() {
                binding.on_shown();
            }
        }));

        binding.on_shown();
        assert_eq!(binding.state(), BindingState::Live(h(1)));
        assert_eq!(backend.destroyed(), vec![h(2)]);

        drop(binding);
        assert_eq!(backend.destroyed(), vec![h(2), h(1)]);

        let mut created = backend.created();
        created.sort_by_key(|handle| handle.raw());
        assert_eq!(created, vec![h(1), h(2)]);
    }

    #[test]
    fn test_close_from_other_thread() {
        let host = Arc::new(ScriptedHost::new(Size::new(10, 10)));
        let backend = Arc::new(TracingBackend::new(SequenceBackend::new(&[8])));
        let binding = Arc::new(RenderBinding::new(Arc::clone(&host), Arc::clone(&backend)));

        binding.on_shown();

        let closer = {
            let binding = Arc::clone(&binding);
            std::thread::spawn(move || binding.close())
        };
        binding.on_hidden();
        closer.join().unwrap();

        assert_eq!(backend.destroyed(), vec![h(8)]);
        assert_eq!(binding.state(), BindingState::Idle);
    }
}
