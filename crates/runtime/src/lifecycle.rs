//! Ownership ledger for everything the engine registers with the rendering
//! runtime: event listeners, timers, debounce slots, the per-frame slot and
//! the rotation loop.
//!
//! Listeners are only ever removed through a [`Disposer`] or by
//! [`LifecycleTracker::teardown_all`], so each one is unbound exactly once.

use tracing::debug;

use crate::animation::RotationLoop;
use crate::frame::FrameSlot;
use crate::timers::{DebounceSlots, TimerId, TimerQueue};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

/// Runtime events the engine listens to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    StyleLoad,
    MouseMove,
    MouseLeave,
    Click,
    ZoomEnd,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::StyleLoad => "style.load",
            EventKind::MouseMove => "mousemove",
            EventKind::MouseLeave => "mouseleave",
            EventKind::Click => "click",
            EventKind::ZoomEnd => "zoomend",
        }
    }
}

/// Anything listeners can be attached to, optionally scoped to one layer.
pub trait EventTarget {
    fn bind(&mut self, event: EventKind, layer: Option<&str>) -> ListenerId;

    /// Returns `false` when the listener is unknown.
    fn unbind(&mut self, listener: ListenerId) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding<H> {
    pub event: EventKind,
    pub layer: Option<String>,
    pub handler: H,
    pub listener: ListenerId,
}

/// Sole handle for unregistering one binding. Consumed on use.
#[must_use = "dropping a Disposer leaves the listener bound until teardown_all"]
#[derive(Debug, PartialEq, Eq)]
pub struct Disposer {
    listener: ListenerId,
}

impl Disposer {
    pub fn listener(&self) -> ListenerId {
        self.listener
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub listeners: usize,
    pub timers: usize,
    pub frame_request: bool,
    pub rotation: bool,
}

/// Ledger keyed by handler type `H` and timer payload type `T`.
#[derive(Debug)]
pub struct LifecycleTracker<H, T> {
    bindings: Vec<Binding<H>>,
    timers: TimerQueue<T>,
    debounce: DebounceSlots,
    frame: FrameSlot<T>,
    rotation: Option<RotationLoop>,
}

impl<H, T> Default for LifecycleTracker<H, T> {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
            timers: TimerQueue::new(),
            debounce: DebounceSlots::new(),
            frame: FrameSlot::new(),
            rotation: None,
        }
    }
}

impl<H, T> LifecycleTracker<H, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: EventTarget + ?Sized>(
        &mut self,
        target: &mut E,
        event: EventKind,
        layer: Option<&str>,
        handler: H,
    ) -> Disposer {
        let listener = target.bind(event, layer);
        self.bindings.push(Binding {
            event,
            layer: layer.map(str::to_string),
            handler,
            listener,
        });
        Disposer { listener }
    }

    /// Unbinds the listener behind `disposer`. Returns `false` if it was
    /// already released by `teardown_all`.
    pub fn dispose<E: EventTarget + ?Sized>(&mut self, target: &mut E, disposer: Disposer) -> bool {
        let Some(idx) = self
            .bindings
            .iter()
            .position(|b| b.listener == disposer.listener)
        else {
            debug!(listener = disposer.listener.0, "disposer outlived its binding");
            return false;
        };
        let binding = self.bindings.remove(idx);
        target.unbind(binding.listener);
        true
    }

    pub fn handler_for(&self, listener: ListenerId) -> Option<&H> {
        self.bindings
            .iter()
            .find(|b| b.listener == listener)
            .map(|b| &b.handler)
    }

    pub fn bindings(&self) -> &[Binding<H>] {
        &self.bindings
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn schedule(&mut self, deadline_ms: u64, task: T) -> TimerId {
        self.timers.schedule(deadline_ms, task)
    }

    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.debounce.fired(id);
        self.timers.cancel(id).is_some()
    }

    /// Replaces whatever is pending in `slot` with `task` at `now + delay`.
    pub fn debounce(&mut self, slot: &'static str, now_ms: u64, delay_ms: u64, task: T) -> TimerId {
        self.debounce
            .schedule(&mut self.timers, slot, now_ms.saturating_add(delay_ms), task)
    }

    pub fn cancel_debounce(&mut self, slot: &'static str) -> bool {
        self.debounce.cancel(&mut self.timers, slot)
    }

    pub fn is_debounce_pending(&self, slot: &'static str) -> bool {
        self.debounce.is_pending(slot)
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Pops the next due task, releasing its debounce slot if it had one.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<T> {
        let (id, task) = self.timers.pop_due(now_ms)?;
        self.debounce.fired(id);
        Some(task)
    }

    pub fn request_frame(&mut self, task: T) -> Option<T> {
        self.frame.request(task)
    }

    pub fn take_frame(&mut self) -> Option<T> {
        self.frame.take()
    }

    /// Starts auto-rotation, cancelling any loop already running.
    pub fn start_rotation(&mut self, rotation: RotationLoop) {
        if self.rotation.replace(rotation).is_some() {
            debug!("replaced running rotation loop");
        }
    }

    pub fn stop_rotation(&mut self) -> bool {
        self.rotation.take().is_some()
    }

    pub fn rotation_mut(&mut self) -> Option<&mut RotationLoop> {
        self.rotation.as_mut()
    }

    pub fn is_rotating(&self) -> bool {
        self.rotation.is_some()
    }

    /// Unbinds every listener once and cancels all timers, debounce slots,
    /// the pending frame request and the rotation loop.
    pub fn teardown_all<E: EventTarget + ?Sized>(&mut self, target: &mut E) -> TeardownReport {
        let mut report = TeardownReport::default();
        for binding in self.bindings.drain(..) {
            if !target.unbind(binding.listener) {
                debug!(
                    listener = binding.listener.0,
                    event = binding.event.as_str(),
                    "listener already gone"
                );
            }
            report.listeners += 1;
        }
        report.timers = self.timers.clear();
        self.debounce.clear();
        report.frame_request = self.frame.clear();
        report.rotation = self.rotation.take().is_some();
        debug!(?report, "lifecycle teardown");
        report
    }
}
