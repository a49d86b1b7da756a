//! The consumed/produced surface of a navigation stack.
//!
//! Push/pop/backstack semantics live outside this crate; the bridge only
//! forwards host callbacks into stacks through this trait and delegates
//! per-stack state persistence to them.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::bridge::LifecycleBridge;
use crate::host::Menu;
use crate::ids::{HostId, InstanceId, MenuItemId, RenderTargetId};
use crate::state::StateContainer;

/// Callbacks a navigation stack receives from its owning bridge.
///
/// Result and permission deliveries are fanned out to every stack owned by
/// the bridge; a stack must ignore requester ids it does not own.
pub trait NavigationStack {
    /// The host is being torn down for this detach cycle.
    fn on_host_destroyed(&mut self, host: HostId);

    /// A result-yielding host action finished. `requester` identifies the
    /// navigation unit that issued the request.
    fn on_activity_result(
        &mut self,
        requester: &InstanceId,
        code: i32,
        outcome: i32,
        data: Option<&StateContainer>,
    );

    /// Permission grants arrived. `grants` parallels `permissions`.
    fn on_permissions_result(
        &mut self,
        requester: &InstanceId,
        code: i32,
        permissions: &[String],
        grants: &[bool],
    );

    /// Tri-state rationale query: `Some(true)` handled and rationale wanted,
    /// `Some(false)` explicitly declined, `None` not applicable to this stack.
    fn handle_requested_permission(&mut self, permission: &str) -> Option<bool>;

    /// Serialize this stack's own state (backstack, mid-transition handler
    /// identities) into `out`.
    fn save_instance_state(&mut self, out: &mut StateContainer);

    /// Restore state previously written by `save_instance_state`.
    fn restore_instance_state(&mut self, state: &StateContainer);

    fn on_host_started(&mut self, host: HostId);
    fn on_host_resumed(&mut self, host: HostId);
    fn on_host_paused(&mut self, host: HostId);
    fn on_host_stopped(&mut self, host: HostId);

    /// Contribute items to the host menu. Always fanned out to all stacks.
    fn build_menu(&mut self, menu: &mut Menu);

    /// Adjust an already built menu. Always fanned out to all stacks.
    fn prepare_menu(&mut self, menu: &mut Menu);

    /// Claim a selected menu item. First stack returning `true` wins.
    fn menu_item_selected(&mut self, item: MenuItemId) -> bool;
}

/// Constructs a stack bound to `(bridge, target)` the first time the target
/// is requested. The bridge reference is weak; the stack must not keep its
/// bridge alive past final teardown.
pub type StackFactory =
    dyn Fn(Weak<LifecycleBridge>, RenderTargetId) -> Rc<RefCell<dyn NavigationStack>>;
