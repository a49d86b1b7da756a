//! Transition orchestration: swapping the visible UI of one navigation unit
//! for another.
//!
//! ## Architecture
//!
//! ```text
//! NavigationStack (external)
//!         │  ChangeRequest
//!         ▼
//! TransitionCoordinator.execute()
//!         │
//!         ├── push: record in-flight entrance (abortable later)
//!         ├── pop:  abort a pending entrance for the outgoing unit
//!         ├── notify listeners (started), materialize views,
//!         │   notify units (started, directional tag)
//!         └── TransitionHandler.perform_change(..., CompletionSink)
//!                     │  (synchronously or on a later turn)
//!                     ▼
//!         from-ended → in-flight removal → to-ended → listener fan-out
//! ```
//!
//! The coordinator runs on a single logical thread. Long transitions suspend
//! via the completion sink rather than blocking; a handler that never fires
//! its sink permanently stalls that unit pair, which is a contract violation
//! the coordinator does not time out on.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{StateResult, TransitionError, TransitionResult};
use crate::handlers::SimpleSwapHandler;
use crate::host::RenderSurface;
use crate::ids::{InstanceId, ViewHandle};
use crate::state::StateContainer;

/// A navigation unit as seen by the orchestrator: one entry of a stack with a
/// stable identity, an optional materialized view, and change notifications.
pub trait NavUnit {
    fn instance_id(&self) -> InstanceId;

    /// Render this unit's view into the container, returning its handle.
    fn materialize_view(&mut self, container: &Rc<RefCell<dyn RenderSurface>>) -> ViewHandle;

    /// The existing rendered view, if any.
    fn view(&self) -> Option<ViewHandle>;

    fn change_started(&mut self, kind: TransitionKind);
    fn change_ended(&mut self, kind: TransitionKind);
}

/// Shared handle to a navigation unit.
pub type SharedUnit = Rc<RefCell<dyn NavUnit>>;

/// Shared handle to a transition handler; one in-flight entrance holds one.
pub type SharedHandler = Rc<RefCell<Box<dyn TransitionHandler>>>;

/// Direction tag delivered with every change-started/change-ended pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    PushEnter,
    PushExit,
    PopEnter,
    PopExit,
}

impl TransitionKind {
    /// Tag for the unit entering the render target.
    pub fn enter(is_push: bool) -> Self {
        if is_push {
            Self::PushEnter
        } else {
            Self::PopEnter
        }
    }

    /// Tag for the unit leaving the render target.
    pub fn exit(is_push: bool) -> Self {
        if is_push {
            Self::PushExit
        } else {
            Self::PopExit
        }
    }

    pub fn is_enter(self) -> bool {
        matches!(self, Self::PushEnter | Self::PopEnter)
    }

    pub fn is_push(self) -> bool {
        matches!(self, Self::PushEnter | Self::PushExit)
    }
}

/// Fires exactly once when a handler finishes its swap. Cloneable so a
/// handler can stash it for a later turn; a second fire is a guarded no-op.
#[derive(Clone)]
pub struct CompletionSink {
    inner: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl CompletionSink {
    pub fn new(on_complete: impl FnOnce() + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Some(Box::new(on_complete)))),
        }
    }

    /// Run the completion chain. Later calls do nothing.
    pub fn complete(&self) {
        let callback = self.inner.borrow_mut().take();
        match callback {
            Some(callback) => callback(),
            None => warn!("completion sink fired more than once; ignoring"),
        }
    }

    /// True while the completion chain has not run yet.
    pub fn is_pending(&self) -> bool {
        self.inner.borrow().is_some()
    }
}

/// Coordinates the swap of views between two navigation units.
///
/// Implementations own the visuals (fades, slides, instant swaps); the
/// orchestrator only requires that the sink passed to [`perform_change`]
/// eventually fires, exactly once.
///
/// [`perform_change`]: TransitionHandler::perform_change
pub trait TransitionHandler {
    /// Stable identity standing in for class identity when the handler is
    /// persisted; must match a constructor in the [`HandlerRegistry`].
    fn tag(&self) -> &'static str;

    /// Swap `from` for `to` inside `container`, firing `done` when finished.
    fn perform_change(
        &mut self,
        container: &Rc<RefCell<dyn RenderSurface>>,
        from: Option<ViewHandle>,
        to: Option<ViewHandle>,
        is_push: bool,
        done: CompletionSink,
    );

    /// Persist enough to represent this handler's prior choice across process
    /// death. Completion is never replayed, only identity.
    fn save_state(&self, _out: &mut StateContainer) -> StateResult<()> {
        Ok(())
    }

    fn restore_state(&mut self, _state: &StateContainer) {}

    /// Called when the entrance this handler is running is superseded by a
    /// pop before completing. The handler must stop and hand off immediately
    /// rather than leave a dangling visual artifact.
    fn on_abort_push(&mut self, _new_handler: &SharedHandler, _new_top: Option<&SharedUnit>) {}

    /// Called when the entering unit must become fully attached right now,
    /// with no animation (e.g. a state snapshot is imminent).
    fn complete_immediately(&mut self) {}

    /// Whether the outgoing view should be detached on push. Handlers that
    /// render both views simultaneously override this to `false`.
    fn removes_from_view_on_push(&self) -> bool {
        true
    }
}

/// What changed, delivered to listeners on start and on completion. Carries
/// the render target and the tag of the handler driving the change so a
/// listener can chain follow-up work without outside bookkeeping.
#[derive(Clone)]
pub struct TransitionEvent {
    pub to: Option<SharedUnit>,
    pub from: Option<SharedUnit>,
    pub is_push: bool,
    pub container: Rc<RefCell<dyn RenderSurface>>,
    pub handler_tag: &'static str,
}

/// External observer of transition start/completion.
pub trait TransitionListener {
    fn on_change_started(&self, event: &TransitionEvent);
    fn on_change_completed(&self, event: &TransitionEvent);
}

/// One requested swap.
pub struct ChangeRequest {
    pub to: Option<SharedUnit>,
    pub from: Option<SharedUnit>,
    pub is_push: bool,
    pub container: Option<Rc<RefCell<dyn RenderSurface>>>,
    pub handler: Option<Box<dyn TransitionHandler>>,
    pub listeners: Vec<Rc<dyn TransitionListener>>,
}

impl ChangeRequest {
    /// A push bringing `to` into `container`.
    pub fn push(to: SharedUnit, container: Rc<RefCell<dyn RenderSurface>>) -> Self {
        Self {
            to: Some(to),
            from: None,
            is_push: true,
            container: Some(container),
            handler: None,
            listeners: Vec::new(),
        }
    }

    /// A pop removing `from` out of `container`.
    pub fn pop(from: SharedUnit, container: Rc<RefCell<dyn RenderSurface>>) -> Self {
        Self {
            to: None,
            from: Some(from),
            is_push: false,
            container: Some(container),
            handler: None,
            listeners: Vec::new(),
        }
    }

    pub fn with_from(mut self, from: SharedUnit) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_to(mut self, to: SharedUnit) -> Self {
        self.to = Some(to);
        self
    }

    pub fn with_handler(mut self, handler: Box<dyn TransitionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_listener(mut self, listener: Rc<dyn TransitionListener>) -> Self {
        self.listeners.push(listener);
        self
    }
}

/// Coordination table of in-flight entrance transitions, keyed by the
/// identity of the unit currently entering.
///
/// Cheaply cloneable; clones share one table. At most one in-flight entrance
/// is tracked per unit identity at a time.
#[derive(Clone, Default)]
pub struct TransitionCoordinator {
    in_flight: Rc<RefCell<HashMap<InstanceId, SharedHandler>>>,
}

impl TransitionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The central swap operation. Returns once the handler has been invoked;
    /// completion arrives through the sink, possibly synchronously.
    pub fn execute(&self, request: ChangeRequest) {
        let Some(container) = request.container else {
            trace!("change request without a container; nothing to render into");
            return;
        };

        let handler: SharedHandler = Rc::new(RefCell::new(
            request
                .handler
                .unwrap_or_else(|| Box::new(SimpleSwapHandler::new())),
        ));

        if request.is_push {
            if let Some(to) = &request.to {
                let id = to.borrow().instance_id();
                trace!(unit = %id, "recording in-flight entrance");
                self.in_flight.borrow_mut().insert(id, Rc::clone(&handler));
            }
        } else if let Some(from) = &request.from {
            let id = from.borrow().instance_id();
            self.abort_push(&id, &handler, request.to.as_ref());
        }

        let listeners = request.listeners;
        let event = TransitionEvent {
            to: request.to.clone(),
            from: request.from.clone(),
            is_push: request.is_push,
            container: Rc::clone(&container),
            handler_tag: handler.borrow().tag(),
        };
        for listener in &listeners {
            listener.on_change_started(&event);
        }

        let to_kind = TransitionKind::enter(request.is_push);
        let from_kind = TransitionKind::exit(request.is_push);

        let to_view = request.to.as_ref().map(|to| {
            let view = to.borrow_mut().materialize_view(&container);
            to.borrow_mut().change_started(to_kind);
            view
        });
        let from_view = request.from.as_ref().and_then(|from| {
            let view = from.borrow().view();
            from.borrow_mut().change_started(from_kind);
            view
        });

        let done = {
            let in_flight = Rc::clone(&self.in_flight);
            let to = request.to.clone();
            let from = request.from.clone();
            let event = event.clone();
            CompletionSink::new(move || {
                if let Some(from) = &from {
                    from.borrow_mut().change_ended(from_kind);
                }
                if let Some(to) = &to {
                    let id = to.borrow().instance_id();
                    in_flight.borrow_mut().remove(&id);
                    to.borrow_mut().change_ended(to_kind);
                }
                for listener in &listeners {
                    listener.on_change_completed(&event);
                }
            })
        };

        handler
            .borrow_mut()
            .perform_change(&container, from_view, to_view, request.is_push, done);
    }

    /// Abort protocol: if `unit` has a pending entrance, remove it from the
    /// table and hand the still-running handler off to the superseding one.
    /// A second abort for the same identity is a no-op.
    pub fn abort_push(
        &self,
        unit: &InstanceId,
        new_handler: &SharedHandler,
        new_top: Option<&SharedUnit>,
    ) {
        let aborted = self.in_flight.borrow_mut().remove(unit);
        if let Some(aborted) = aborted {
            debug!(unit = %unit, "aborting in-flight entrance");
            aborted.borrow_mut().on_abort_push(new_handler, new_top);
        }
    }

    /// Force a pending entrance for `unit` to finish right now, with no
    /// animation. No-op when nothing is in flight for that identity.
    pub fn complete_push_immediately(&self, unit: &InstanceId) {
        let handler = self.in_flight.borrow().get(unit).cloned();
        if let Some(handler) = handler {
            debug!(unit = %unit, "completing in-flight entrance immediately");
            handler.borrow_mut().complete_immediately();
        }
    }

    /// Whether an entrance for `unit` is still in flight.
    pub fn is_in_flight(&self, unit: &InstanceId) -> bool {
        self.in_flight.borrow().contains_key(unit)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.borrow().len()
    }
}

/// A persisted transition handler: identity tag plus opaque saved state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTransition {
    pub tag: String,
    pub state: StateContainer,
}

impl SavedTransition {
    /// Capture a handler's identity and state for persistence.
    pub fn capture(handler: &dyn TransitionHandler) -> TransitionResult<Self> {
        let mut state = StateContainer::new();
        handler.save_state(&mut state)?;
        Ok(Self {
            tag: handler.tag().to_owned(),
            state,
        })
    }
}

/// Registration map from stable handler tags to zero-argument constructors,
/// used to reconstruct handlers after process death. A saved tag with no
/// registered constructor is a configuration error, reported at
/// reconstruction time.
pub struct HandlerRegistry {
    constructors: HashMap<String, Box<dyn Fn() -> Box<dyn TransitionHandler>>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };
        registry.register(SimpleSwapHandler::TAG, || Box::new(SimpleSwapHandler::new()));
        registry
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        tag: &str,
        constructor: impl Fn() -> Box<dyn TransitionHandler> + 'static,
    ) {
        self.constructors
            .insert(tag.to_owned(), Box::new(constructor));
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Reconstruct a handler from its saved identity and state.
    pub fn restore(&self, saved: &SavedTransition) -> TransitionResult<Box<dyn TransitionHandler>> {
        let constructor = self
            .constructors
            .get(&saved.tag)
            .ok_or_else(|| TransitionError::UnknownHandlerTag(saved.tag.clone()))?;
        let mut handler = constructor();
        handler.restore_state(&saved.state);
        Ok(handler)
    }
}
