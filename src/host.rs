//! Host-environment surface consumed by the bridge.
//!
//! The host runtime owns lifecycle events and render surfaces. This module
//! defines the seams through which the crate talks back to it: a container
//! abstraction with retained storage, an outbound channel for host actions,
//! and the minimal menu/render-surface types forwarded through callbacks.

use std::rc::Rc;

use crate::error::BridgeResult;
use crate::ids::{HostId, MenuItemId, ViewHandle};
use crate::provider::BridgeComponent;
use crate::state::StateContainer;

/// An opaque description of a host action (the analogue of an intent):
/// something the host can launch on the crate's behalf, optionally yielding a
/// result back through the bridge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostRequest {
    /// What to launch, in host-defined terms.
    pub action: String,

    /// Opaque payload forwarded untouched.
    pub payload: StateContainer,
}

impl HostRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            payload: StateContainer::new(),
        }
    }
}

/// Outbound channel from the bridge to its host.
///
/// Implemented by whatever the active provider attaches to the host; the
/// bridge forwards through it without caring how the host dispatches.
pub trait HostChannel {
    /// Prompt the user for the given permissions, replying later through
    /// `LifecycleBridge::on_permission_result` with the same code.
    fn request_permissions(&self, permissions: &[String], code: i32);

    /// Launch a result-yielding host action. The eventual outcome arrives
    /// through `LifecycleBridge::on_activity_result` with the same code.
    fn start_for_result(&self, request: &HostRequest, code: i32, options: Option<&StateContainer>);

    /// Launch a fire-and-forget host action.
    fn start(&self, request: &HostRequest);

    /// Ask the host to rebuild its menu on the next turn.
    fn invalidate_menu(&self);
}

/// A host container: the long-lived environment object that owns lifecycle
/// events and render surfaces.
///
/// The retained-storage methods model the host capability of parking an
/// invisible component that survives container recreation; the default
/// provider uses them, alternate providers may attach some other way.
pub trait HostContainer {
    fn id(&self) -> HostId;

    /// Host-environment metadata, consulted for provider selection.
    fn metadata(&self, key: &str) -> Option<String>;

    /// The channel through which the bridge issues host actions.
    fn channel(&self) -> Rc<dyn HostChannel>;

    /// Park a retained component under `tag`. The host may complete the
    /// attachment asynchronously; until it does, `find_retained` may miss.
    fn attach_retained(&self, tag: &str, component: Rc<BridgeComponent>) -> BridgeResult<()>;

    /// Look up a previously parked component.
    fn find_retained(&self, tag: &str) -> Option<Rc<BridgeComponent>>;
}

/// A render surface within the host container. Transition handlers attach and
/// detach opaque view handles; the crate never draws.
pub trait RenderSurface {
    fn attach(&mut self, view: ViewHandle);
    fn detach(&mut self, view: ViewHandle);
    fn contains(&self, view: ViewHandle) -> bool;
}

/// A menu item contributed by a navigation stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub title: String,
}

/// Menu under construction, passed through the build/prepare fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Menu {
    items: Vec<MenuItem>,
}

impl Menu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, id: MenuItemId, title: impl Into<String>) {
        self.items.push(MenuItem {
            id,
            title: title.into(),
        });
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
