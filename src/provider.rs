//! Attachment strategies binding a bridge to its host container.
//!
//! The default strategy parks an invisible retained component in the host's
//! retained storage so the bridge survives host recreation. Alternate
//! strategies (selected through host metadata) can attach however their
//! environment requires, as long as `find_existing` recovers the same bridge
//! after a recreation.

use std::rc::Rc;

use crate::bridge::LifecycleBridge;
use crate::error::BridgeResult;
use crate::host::{HostContainer, Menu};
use crate::ids::{HostId, MenuItemId};
use crate::state::StateContainer;

/// Tag under which the default provider parks its retained component.
pub const RETAINED_COMPONENT_TAG: &str = "nav.bridge.retained";

/// The retained payload: owns the bridge across host recreations and is the
/// entry point through which the host runtime delivers its callbacks.
pub struct BridgeComponent {
    bridge: Rc<LifecycleBridge>,
}

impl BridgeComponent {
    pub fn new(bridge: Rc<LifecycleBridge>) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> Rc<LifecycleBridge> {
        Rc::clone(&self.bridge)
    }

    pub fn on_attach(&self, host: Rc<dyn HostContainer>) {
        self.bridge.on_host_attach(host);
    }

    pub fn on_detach(&self) {
        self.bridge.on_host_detach();
    }

    pub fn on_destroy(&self) {
        self.bridge.on_host_destroy_final();
    }

    pub fn on_activity_result(&self, code: i32, outcome: i32, data: Option<&StateContainer>) {
        self.bridge.on_activity_result(code, outcome, data);
    }

    pub fn on_permission_result(&self, code: i32, permissions: &[String], grants: &[bool]) {
        self.bridge.on_permission_result(code, permissions, grants);
    }

    pub fn on_host_started(&self, host: HostId) {
        self.bridge.on_host_started(host);
    }

    pub fn on_host_resumed(&self, host: HostId) {
        self.bridge.on_host_resumed(host);
    }

    pub fn on_host_paused(&self, host: HostId) {
        self.bridge.on_host_paused(host);
    }

    pub fn on_host_stopped(&self, host: HostId) {
        self.bridge.on_host_stopped(host);
    }

    pub fn build_menu(&self, menu: &mut Menu) {
        self.bridge.build_menu(menu);
    }

    pub fn prepare_menu(&self, menu: &mut Menu) {
        self.bridge.prepare_menu(menu);
    }

    pub fn menu_item_selected(&self, item: MenuItemId) -> bool {
        self.bridge.menu_item_selected(item)
    }
}

/// How a bridge gets attached to, and later recovered from, a host.
pub trait BridgeProvider {
    /// Bind `bridge` to `host` so a later `find_existing` on a recreated host
    /// returns it. Attachment may complete asynchronously.
    fn attach(&self, host: &Rc<dyn HostContainer>, bridge: Rc<LifecycleBridge>)
        -> BridgeResult<()>;

    /// Recover the bridge previously attached to `host`, if any.
    fn find_existing(&self, host: &Rc<dyn HostContainer>) -> Option<Rc<LifecycleBridge>>;
}

/// Default provider: a retained component in host storage.
#[derive(Debug, Default)]
pub struct RetainedComponentProvider;

impl RetainedComponentProvider {
    pub fn new() -> Self {
        Self
    }
}

impl BridgeProvider for RetainedComponentProvider {
    fn attach(
        &self,
        host: &Rc<dyn HostContainer>,
        bridge: Rc<LifecycleBridge>,
    ) -> BridgeResult<()> {
        host.attach_retained(RETAINED_COMPONENT_TAG, Rc::new(BridgeComponent::new(bridge)))
    }

    fn find_existing(&self, host: &Rc<dyn HostContainer>) -> Option<Rc<LifecycleBridge>> {
        host.find_retained(RETAINED_COMPONENT_TAG)
            .map(|component| component.bridge())
    }
}
