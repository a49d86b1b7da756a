//! Lifecycle bridging and view transition orchestration for navigation stacks.
//!
//! This crate provides the plumbing between a host runtime (the thing that
//! owns windows, lifecycle events, permission prompts and result-yielding
//! launches) and the navigation stacks that live inside it. The design
//! ensures:
//!
//! 1. **One bridge per host** - A registry resolves a single authoritative
//!    `LifecycleBridge` per host container, even across host recreation
//! 2. **Lossless requests** - Permission requests issued while detached are
//!    parked and replayed in order on the next attachment
//! 3. **Deterministic transitions** - View changes complete exactly once, in
//!    a fixed notification order, and a pop aborts a still-running entrance
//! 4. **Testable** - Every seam is a trait; in-memory doubles drive the
//!    whole lifecycle without a real host
//!
//! # Architecture
//!
//! ```text
//! host runtime ──► BridgeComponent ──► LifecycleBridge ──► NavigationStack(s)
//!                                           ▲
//!                  BridgeRegistry ──────────┘ (one per host, provider-attached)
//!
//! NavigationStack ──► TransitionCoordinator ──► TransitionHandler ──► RenderSurface
//! ```
//!
//! # Example
//!
//! ```ignore
//! use nav_host::{BridgeRegistry, RenderTargetId};
//!
//! let registry = BridgeRegistry::new(|bridge, target| make_stack(bridge, target));
//! let bridge = registry.install(&host)?;
//! let stack = bridge.get_stack(RenderTargetId(1), saved_state.as_ref());
//! ```

mod bridge;
mod error;
mod handlers;
mod host;
mod ids;
mod provider;
mod stack;
mod state;
mod transition;

pub use bridge::{
    stack_state_key, BridgeRegistry, LifecycleBridge, PendingPermissionRequest,
    PROVIDER_METADATA_KEY,
};
pub use error::{BridgeError, BridgeResult, StateResult, TransitionError, TransitionResult};
pub use handlers::SimpleSwapHandler;
pub use host::{HostChannel, HostContainer, HostRequest, Menu, MenuItem, RenderSurface};
pub use ids::{HostId, InstanceId, MenuItemId, RenderTargetId, ViewHandle};
pub use provider::{
    BridgeComponent, BridgeProvider, RetainedComponentProvider, RETAINED_COMPONENT_TAG,
};
pub use stack::{NavigationStack, StackFactory};
pub use state::StateContainer;
pub use transition::{
    ChangeRequest, CompletionSink, HandlerRegistry, NavUnit, SavedTransition, SharedHandler,
    SharedUnit, TransitionCoordinator, TransitionEvent, TransitionHandler, TransitionKind,
    TransitionListener,
};
