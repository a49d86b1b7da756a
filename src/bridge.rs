//! Host lifecycle bridging: one `LifecycleBridge` per logical host container,
//! multiplexing host callbacks to the navigation stacks it owns.
//!
//! ## Architecture
//!
//! ```text
//! host runtime ──lifecycle/result/menu callbacks──▶ BridgeComponent
//!                                                        │
//!                                                        ▼
//!                                                 LifecycleBridge
//!                                                        │ fan-out
//!                         ┌──────────────┬───────────────┤
//!                         ▼              ▼               ▼
//!                    NavigationStack  NavigationStack  (one per render target)
//! ```
//!
//! The bridge survives host destroy/recreate cycles via the retained
//! attachment the active provider installs; the `BridgeRegistry` resolves a
//! second install for the same host before that attachment completes, so a
//! host never ends up with two authoritative bridges.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{BridgeError, BridgeResult};
use crate::host::{HostChannel, HostContainer, HostRequest, Menu};
use crate::ids::{HostId, InstanceId, MenuItemId, RenderTargetId};
use crate::provider::{BridgeProvider, RetainedComponentProvider};
use crate::stack::{NavigationStack, StackFactory};
use crate::state::StateContainer;

const KEY_PERMISSION_CODES: &str = "bridge.permissionRequestCodes";
const KEY_RESULT_CODES: &str = "bridge.resultRequestCodes";
const KEY_PENDING_PERMISSIONS: &str = "bridge.pendingPermissionRequests";
const KEY_STACK_STATE_PREFIX: &str = "bridge.stackState.";

/// Host metadata key naming the provider to use for attachment. Absent means
/// the default retained-component provider.
pub const PROVIDER_METADATA_KEY: &str = "nav.bridge.provider";

/// Key under which a stack's own state is saved, derived from the render
/// target's stable integer identity.
pub fn stack_state_key(target: RenderTargetId) -> String {
    format!("{KEY_STACK_STATE_PREFIX}{}", target.0)
}

/// A permission request issued while the host was not attached, parked until
/// the next attachment and then replayed through the normal request path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPermissionRequest {
    pub requester: InstanceId,
    pub permissions: Vec<String>,
    pub code: i32,
}

type ActiveBridges = RefCell<HashMap<HostId, Rc<LifecycleBridge>>>;
type StackEntry = (RenderTargetId, Rc<RefCell<dyn NavigationStack>>);

/// Attaches to a host container, survives its recreation, and multiplexes
/// host-level callbacks to one or more navigation stacks.
///
/// All mutation happens on the host's single UI thread; interior mutability
/// stands in for locking, and collections are snapshotted before fan-out so
/// re-entrant calls from a stack cannot corrupt them.
pub struct LifecycleBridge {
    self_ref: Weak<LifecycleBridge>,
    active: Weak<ActiveBridges>,
    host: RefCell<Option<Rc<dyn HostContainer>>>,
    attached: Cell<bool>,
    destroyed: Cell<bool>,
    stacks: RefCell<Vec<StackEntry>>,
    permission_codes: RefCell<HashMap<i32, InstanceId>>,
    result_codes: RefCell<HashMap<i32, InstanceId>>,
    pending_permissions: RefCell<Vec<PendingPermissionRequest>>,
    stack_factory: Rc<StackFactory>,
}

impl LifecycleBridge {
    fn new(stack_factory: Rc<StackFactory>, active: Weak<ActiveBridges>) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            active,
            host: RefCell::new(None),
            attached: Cell::new(false),
            destroyed: Cell::new(false),
            stacks: RefCell::new(Vec::new()),
            permission_codes: RefCell::new(HashMap::new()),
            result_codes: RefCell::new(HashMap::new()),
            pending_permissions: RefCell::new(Vec::new()),
            stack_factory,
        })
    }

    pub(crate) fn bind_host(&self, host: Rc<dyn HostContainer>) {
        *self.host.borrow_mut() = Some(host);
    }

    /// Identity of the host currently bound, if any.
    pub fn host_id(&self) -> Option<HostId> {
        self.host.borrow().as_ref().map(|host| host.id())
    }

    /// True while the host is in a state where immediate interaction (for
    /// example a permission prompt) is possible.
    pub fn is_attached(&self) -> bool {
        self.attached.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    fn channel(&self) -> Option<Rc<dyn HostChannel>> {
        self.host.borrow().as_ref().map(|host| host.channel())
    }

    fn stacks_snapshot(&self) -> Vec<Rc<RefCell<dyn NavigationStack>>> {
        self.stacks
            .borrow()
            .iter()
            .map(|(_, stack)| Rc::clone(stack))
            .collect()
    }

    /// Snapshot of the owned stacks, in registration order.
    pub fn stacks(&self) -> Vec<Rc<RefCell<dyn NavigationStack>>> {
        self.stacks_snapshot()
    }

    /// Return the stack bound to `target`, creating it on first request.
    ///
    /// When `restore` holds a sub-record for this target, the new stack's
    /// state is restored from it before the stack is returned. A stack, once
    /// created, is reused for the life of the bridge.
    pub fn get_stack(
        &self,
        target: RenderTargetId,
        restore: Option<&StateContainer>,
    ) -> Rc<RefCell<dyn NavigationStack>> {
        let existing = self
            .stacks
            .borrow()
            .iter()
            .find(|(t, _)| *t == target)
            .map(|(_, stack)| Rc::clone(stack));
        if let Some(stack) = existing {
            return stack;
        }

        let stack = (self.stack_factory.as_ref())(self.self_ref.clone(), target);
        if let Some(state) = restore.and_then(|s| s.child(&stack_state_key(target))) {
            stack.borrow_mut().restore_instance_state(&state);
        }
        self.stacks.borrow_mut().push((target, Rc::clone(&stack)));
        debug!(render_target = %target, "created navigation stack");
        stack
    }

    /// Host attached: clears the teardown latch; the first attachment flips
    /// `attached` and replays parked permission requests in FIFO order.
    pub fn on_host_attach(&self, host: Rc<dyn HostContainer>) {
        trace!(host = %host.id(), "host attached");
        self.bind_host(host);
        self.destroyed.set(false);
        self.set_attached();
    }

    fn set_attached(&self) {
        if self.attached.get() {
            return;
        }
        self.attached.set(true);

        // Drained before iterating: a replayed request that re-enqueues (the
        // host detached again mid-replay) must not be walked twice.
        let pending: Vec<PendingPermissionRequest> =
            self.pending_permissions.borrow_mut().drain(..).collect();
        if !pending.is_empty() {
            debug!(count = pending.len(), "replaying pending permission requests");
        }
        for request in pending {
            self.request_permissions(&request.requester, &request.permissions, request.code);
        }
    }

    /// Host detached: interaction is no longer possible; stacks are told of
    /// the host teardown once for this detach cycle.
    pub fn on_host_detach(&self) {
        trace!(host = ?self.host_id(), "host detached");
        self.attached.set(false);
        self.destroy_stacks();
    }

    fn destroy_stacks(&self) {
        if self.destroyed.get() {
            return;
        }
        self.destroyed.set(true);

        if let Some(host_id) = self.host_id() {
            debug!(host = %host_id, "notifying stacks of host destruction");
            for stack in self.stacks_snapshot() {
                stack.borrow_mut().on_host_destroyed(host_id);
            }
        }
    }

    /// Terminal teardown: unregister from the registry, destroy all stacks,
    /// drop the host. Safe to call more than once; later calls are no-ops.
    pub fn on_host_destroy_final(&self) {
        let Some(host_id) = self.host_id() else {
            return;
        };
        debug!(host = %host_id, "final host teardown");

        if let Some(active) = self.active.upgrade() {
            active.borrow_mut().remove(&host_id);
        }
        self.destroy_stacks();
        self.stacks.borrow_mut().clear();
        *self.host.borrow_mut() = None;
    }

    /// Route the eventual result for `code` back to `requester`. Reassigning
    /// a code replaces its previous owner.
    pub fn register_for_result(&self, requester: &InstanceId, code: i32) {
        self.result_codes
            .borrow_mut()
            .insert(code, requester.clone());
    }

    /// Drop every result code owned by `requester`.
    pub fn unregister_for_results(&self, requester: &InstanceId) {
        self.result_codes
            .borrow_mut()
            .retain(|_, owner| owner != requester);
    }

    /// Launch a result-yielding host action on behalf of `requester`.
    pub fn start_for_result(
        &self,
        requester: &InstanceId,
        request: &HostRequest,
        code: i32,
        options: Option<&StateContainer>,
    ) {
        self.register_for_result(requester, code);
        if let Some(channel) = self.channel() {
            channel.start_for_result(request, code, options);
        }
    }

    /// Launch a fire-and-forget host action.
    pub fn start(&self, request: &HostRequest) {
        if let Some(channel) = self.channel() {
            channel.start(request);
        }
    }

    /// Ask the host to rebuild its menu.
    pub fn invalidate_menu(&self) {
        if let Some(channel) = self.channel() {
            channel.invalidate_menu();
        }
    }

    /// Request permissions on behalf of `requester`.
    ///
    /// Forwarded to the host immediately while attached; otherwise parked
    /// FIFO and replayed on the next attachment, so a request issued before
    /// the host is interactive is neither lost nor forwarded prematurely.
    pub fn request_permissions(&self, requester: &InstanceId, permissions: &[String], code: i32) {
        if self.attached.get() {
            self.permission_codes
                .borrow_mut()
                .insert(code, requester.clone());
            if let Some(channel) = self.channel() {
                channel.request_permissions(permissions, code);
            }
        } else {
            trace!(requester = %requester, code, "parking permission request until attach");
            self.pending_permissions
                .borrow_mut()
                .push(PendingPermissionRequest {
                    requester: requester.clone(),
                    permissions: permissions.to_vec(),
                    code,
                });
        }
    }

    /// A result-yielding host action finished. Fans out to every owned stack
    /// with the originating requester id; stacks ignore ids they do not own.
    /// A code with no registered requester is stale and silently dropped.
    pub fn on_activity_result(&self, code: i32, outcome: i32, data: Option<&StateContainer>) {
        let requester = self.result_codes.borrow().get(&code).cloned();
        let Some(requester) = requester else {
            trace!(code, "dropping result with no registered requester");
            return;
        };
        for stack in self.stacks_snapshot() {
            stack
                .borrow_mut()
                .on_activity_result(&requester, code, outcome, data);
        }
    }

    /// Permission grants arrived; same fan-out and staleness rules as
    /// [`on_activity_result`](Self::on_activity_result).
    pub fn on_permission_result(&self, code: i32, permissions: &[String], grants: &[bool]) {
        let requester = self.permission_codes.borrow().get(&code).cloned();
        let Some(requester) = requester else {
            trace!(code, "dropping permission result with no registered requester");
            return;
        };
        for stack in self.stacks_snapshot() {
            stack
                .borrow_mut()
                .on_permissions_result(&requester, code, permissions, grants);
        }
    }

    /// Tri-state rationale query: the first stack with an opinion wins;
    /// `None` means no stack claimed the permission.
    pub fn should_show_permission_rationale(&self, permission: &str) -> Option<bool> {
        for stack in self.stacks_snapshot() {
            if let Some(handled) = stack.borrow_mut().handle_requested_permission(permission) {
                return Some(handled);
            }
        }
        None
    }

    /// Menu construction fans out to every stack in registration order.
    pub fn build_menu(&self, menu: &mut Menu) {
        for stack in self.stacks_snapshot() {
            stack.borrow_mut().build_menu(menu);
        }
    }

    /// Menu preparation fans out to every stack in registration order.
    pub fn prepare_menu(&self, menu: &mut Menu) {
        for stack in self.stacks_snapshot() {
            stack.borrow_mut().prepare_menu(menu);
        }
    }

    /// Item selection short-circuits on the first stack that claims it.
    pub fn menu_item_selected(&self, item: MenuItemId) -> bool {
        for stack in self.stacks_snapshot() {
            if stack.borrow_mut().menu_item_selected(item) {
                return true;
            }
        }
        false
    }

    fn is_current_host(&self, host: HostId) -> bool {
        self.host_id() == Some(host)
    }

    pub fn on_host_started(&self, host: HostId) {
        if self.is_current_host(host) {
            for stack in self.stacks_snapshot() {
                stack.borrow_mut().on_host_started(host);
            }
        }
    }

    pub fn on_host_resumed(&self, host: HostId) {
        if self.is_current_host(host) {
            for stack in self.stacks_snapshot() {
                stack.borrow_mut().on_host_resumed(host);
            }
        }
    }

    pub fn on_host_paused(&self, host: HostId) {
        if self.is_current_host(host) {
            for stack in self.stacks_snapshot() {
                stack.borrow_mut().on_host_paused(host);
            }
        }
    }

    pub fn on_host_stopped(&self, host: HostId) {
        if self.is_current_host(host) {
            for stack in self.stacks_snapshot() {
                stack.borrow_mut().on_host_stopped(host);
            }
        }
    }

    /// Serialize the request-code tables and the pending queue.
    pub fn save_state(&self, out: &mut StateContainer) -> BridgeResult<()> {
        out.put(KEY_PERMISSION_CODES, &*self.permission_codes.borrow())?;
        out.put(KEY_RESULT_CODES, &*self.result_codes.borrow())?;
        out.put(KEY_PENDING_PERMISSIONS, &*self.pending_permissions.borrow())?;
        Ok(())
    }

    /// Restore what [`save_state`](Self::save_state) wrote. Absent or foreign
    /// keys leave the corresponding table empty.
    pub fn restore_state(&self, state: &StateContainer) {
        *self.permission_codes.borrow_mut() =
            state.get(KEY_PERMISSION_CODES).unwrap_or_default();
        *self.result_codes.borrow_mut() = state.get(KEY_RESULT_CODES).unwrap_or_default();
        *self.pending_permissions.borrow_mut() =
            state.get(KEY_PENDING_PERMISSIONS).unwrap_or_default();
    }

    /// Each owned stack serializes its own state under a key derived from its
    /// render target; the bridge delegates, it does not own that state.
    pub fn save_stack_states(&self, out: &mut StateContainer) -> BridgeResult<()> {
        let entries: Vec<StackEntry> = self.stacks.borrow().clone();
        for (target, stack) in entries {
            let mut sub = StateContainer::new();
            stack.borrow_mut().save_instance_state(&mut sub);
            out.put_child(&stack_state_key(target), sub)?;
        }
        Ok(())
    }
}

/// Process-scoped registry resolving one authoritative bridge per host.
///
/// The registry exists because the attachment mechanism may complete
/// asynchronously: a second `install` for the same host must resolve to the
/// bridge already being attached, never create a competitor.
pub struct BridgeRegistry {
    active: Rc<ActiveBridges>,
    providers: RefCell<HashMap<String, Rc<dyn BridgeProvider>>>,
    resolved: RefCell<Option<Rc<dyn BridgeProvider>>>,
    stack_factory: Rc<StackFactory>,
}

impl BridgeRegistry {
    pub fn new(
        stack_factory: impl Fn(Weak<LifecycleBridge>, RenderTargetId) -> Rc<RefCell<dyn NavigationStack>>
            + 'static,
    ) -> Self {
        Self {
            active: Rc::new(RefCell::new(HashMap::new())),
            providers: RefCell::new(HashMap::new()),
            resolved: RefCell::new(None),
            stack_factory: Rc::new(stack_factory),
        }
    }

    /// Register an alternate provider under `name`, selectable through host
    /// metadata. Must happen before the first `install` resolves a provider.
    pub fn register_provider(&self, name: &str, provider: Rc<dyn BridgeProvider>) {
        self.providers.borrow_mut().insert(name.to_owned(), provider);
    }

    fn provider(&self, host: &Rc<dyn HostContainer>) -> BridgeResult<Rc<dyn BridgeProvider>> {
        if let Some(provider) = self.resolved.borrow().as_ref() {
            return Ok(Rc::clone(provider));
        }

        let provider: Rc<dyn BridgeProvider> = match host.metadata(PROVIDER_METADATA_KEY) {
            Some(name) => self
                .providers
                .borrow()
                .get(&name)
                .cloned()
                .ok_or(BridgeError::UnknownProvider(name))?,
            None => Rc::new(RetainedComponentProvider::new()),
        };
        *self.resolved.borrow_mut() = Some(Rc::clone(&provider));
        Ok(provider)
    }

    /// Return the authoritative bridge for `host`, creating and attaching one
    /// when none exists. Idempotent: the registry is consulted before the
    /// provider, and a freshly created bridge is registered immediately so a
    /// racing second call resolves to the same instance.
    pub fn install(&self, host: &Rc<dyn HostContainer>) -> BridgeResult<Rc<LifecycleBridge>> {
        if let Some(bridge) = self.find(host)? {
            bridge.bind_host(Rc::clone(host));
            return Ok(bridge);
        }

        let provider = self.provider(host)?;
        let bridge = LifecycleBridge::new(Rc::clone(&self.stack_factory), Rc::downgrade(&self.active));
        provider.attach(host, Rc::clone(&bridge))?;
        bridge.bind_host(Rc::clone(host));
        self.active
            .borrow_mut()
            .insert(host.id(), Rc::clone(&bridge));
        debug!(host = %host.id(), "installed lifecycle bridge");
        Ok(bridge)
    }

    fn find(&self, host: &Rc<dyn HostContainer>) -> BridgeResult<Option<Rc<LifecycleBridge>>> {
        let registered = self.active.borrow().get(&host.id()).cloned();
        if let Some(bridge) = registered {
            return Ok(Some(bridge));
        }

        let provider = self.provider(host)?;
        if let Some(bridge) = provider.find_existing(host) {
            bridge.bind_host(Rc::clone(host));
            self.active
                .borrow_mut()
                .insert(host.id(), Rc::clone(&bridge));
            return Ok(Some(bridge));
        }
        Ok(None)
    }

    /// The registered bridge for `host`, if any.
    pub fn bridge_for(&self, host: HostId) -> Option<Rc<LifecycleBridge>> {
        self.active.borrow().get(&host).cloned()
    }

    /// Number of hosts with a registered bridge.
    pub fn active_count(&self) -> usize {
        self.active.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::BridgeComponent;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingChannel {
        permission_calls: RefCell<Vec<(Vec<String>, i32)>>,
        started: RefCell<Vec<(String, i32)>>,
        fire_and_forget: RefCell<Vec<String>>,
        invalidations: Cell<u32>,
    }

    impl HostChannel for RecordingChannel {
        fn request_permissions(&self, permissions: &[String], code: i32) {
            self.permission_calls
                .borrow_mut()
                .push((permissions.to_vec(), code));
        }

        fn start_for_result(
            &self,
            request: &HostRequest,
            code: i32,
            _options: Option<&StateContainer>,
        ) {
            self.started.borrow_mut().push((request.action.clone(), code));
        }

        fn start(&self, request: &HostRequest) {
            self.fire_and_forget.borrow_mut().push(request.action.clone());
        }

        fn invalidate_menu(&self) {
            self.invalidations.set(self.invalidations.get() + 1);
        }
    }

    struct TestHost {
        id: HostId,
        metadata: HashMap<String, String>,
        channel: Rc<RecordingChannel>,
        retained: RefCell<HashMap<String, Rc<BridgeComponent>>>,
        /// Parked attachments not yet visible to `find_retained`, simulating
        /// an attachment mechanism that completes on a later turn.
        deferred: RefCell<HashMap<String, Rc<BridgeComponent>>>,
        defer_attach: Cell<bool>,
    }

    impl TestHost {
        fn new(id: u64) -> Rc<Self> {
            Rc::new(Self {
                id: HostId(id),
                metadata: HashMap::new(),
                channel: Rc::new(RecordingChannel::default()),
                retained: RefCell::new(HashMap::new()),
                deferred: RefCell::new(HashMap::new()),
                defer_attach: Cell::new(false),
            })
        }

        fn deferring(id: u64) -> Rc<Self> {
            let host = Self::new(id);
            host.defer_attach.set(true);
            host
        }

        fn commit_attachments(&self) {
            let deferred: Vec<(String, Rc<BridgeComponent>)> =
                self.deferred.borrow_mut().drain().collect();
            self.retained.borrow_mut().extend(deferred);
        }
    }

    impl HostContainer for TestHost {
        fn id(&self) -> HostId {
            self.id
        }

        fn metadata(&self, key: &str) -> Option<String> {
            self.metadata.get(key).cloned()
        }

        fn channel(&self) -> Rc<dyn HostChannel> {
            Rc::clone(&self.channel) as Rc<dyn HostChannel>
        }

        fn attach_retained(&self, tag: &str, component: Rc<BridgeComponent>) -> BridgeResult<()> {
            if self.defer_attach.get() {
                self.deferred.borrow_mut().insert(tag.to_owned(), component);
            } else {
                self.retained.borrow_mut().insert(tag.to_owned(), component);
            }
            Ok(())
        }

        fn find_retained(&self, tag: &str) -> Option<Rc<BridgeComponent>> {
            self.retained.borrow().get(tag).cloned()
        }
    }

    /// Records every delivery into a log shared across all stacks a registry
    /// creates, prefixed with the stack's label.
    #[derive(Default)]
    struct TestStack {
        label: String,
        log: Rc<RefCell<Vec<String>>>,
        rationale: Option<bool>,
        saved_marker: Option<String>,
        menu_title: Option<String>,
        claims_item: Option<MenuItemId>,
    }

    impl TestStack {
        fn record(&self, event: impl AsRef<str>) {
            self.log
                .borrow_mut()
                .push(format!("{}:{}", self.label, event.as_ref()));
        }
    }

    impl NavigationStack for TestStack {
        fn on_host_destroyed(&mut self, host: HostId) {
            self.record(format!("destroyed:{host}"));
        }

        fn on_activity_result(
            &mut self,
            requester: &InstanceId,
            code: i32,
            outcome: i32,
            _data: Option<&StateContainer>,
        ) {
            self.record(format!("result:{requester}:{code}:{outcome}"));
        }

        fn on_permissions_result(
            &mut self,
            requester: &InstanceId,
            code: i32,
            _permissions: &[String],
            grants: &[bool],
        ) {
            self.record(format!("grants:{requester}:{code}:{grants:?}"));
        }

        fn handle_requested_permission(&mut self, _permission: &str) -> Option<bool> {
            self.rationale
        }

        fn save_instance_state(&mut self, out: &mut StateContainer) {
            if let Some(marker) = &self.saved_marker {
                let _ = out.put("marker", marker);
            }
        }

        fn restore_instance_state(&mut self, state: &StateContainer) {
            self.saved_marker = state.get("marker");
        }

        fn on_host_started(&mut self, host: HostId) {
            self.record(format!("started:{host}"));
        }

        fn on_host_resumed(&mut self, host: HostId) {
            self.record(format!("resumed:{host}"));
        }

        fn on_host_paused(&mut self, host: HostId) {
            self.record(format!("paused:{host}"));
        }

        fn on_host_stopped(&mut self, host: HostId) {
            self.record(format!("stopped:{host}"));
        }

        fn build_menu(&mut self, menu: &mut Menu) {
            if let Some(title) = &self.menu_title {
                menu.add_item(MenuItemId(menu.items().len() as i32), title.clone());
            }
        }

        fn prepare_menu(&mut self, _menu: &mut Menu) {}

        fn menu_item_selected(&mut self, item: MenuItemId) -> bool {
            self.claims_item == Some(item)
        }
    }

    fn test_registry() -> BridgeRegistry {
        logging_registry(&Rc::new(RefCell::new(Vec::new())))
    }

    fn logging_registry(log: &Rc<RefCell<Vec<String>>>) -> BridgeRegistry {
        let log = Rc::clone(log);
        BridgeRegistry::new(move |_bridge, target| {
            Rc::new(RefCell::new(TestStack {
                label: format!("t{}", target.0),
                log: Rc::clone(&log),
                ..TestStack::default()
            })) as Rc<RefCell<dyn NavigationStack>>
        })
    }

    fn installed(host: &Rc<TestHost>) -> (BridgeRegistry, Rc<LifecycleBridge>) {
        let registry = test_registry();
        let bridge = registry
            .install(&(Rc::clone(host) as Rc<dyn HostContainer>))
            .unwrap();
        bridge.on_host_attach(Rc::clone(host) as Rc<dyn HostContainer>);
        (registry, bridge)
    }

    #[test]
    fn install_is_idempotent_before_attachment_completes() {
        let host = TestHost::deferring(1);
        let registry = test_registry();
        let as_container = Rc::clone(&host) as Rc<dyn HostContainer>;

        let first = registry.install(&as_container).unwrap();
        // The retained attachment has not committed yet; only the registry
        // can resolve this second call.
        assert!(host.find_retained(crate::provider::RETAINED_COMPONENT_TAG).is_none());
        let second = registry.install(&as_container).unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(registry.active_count(), 1);

        host.commit_attachments();
        let third = registry.install(&as_container).unwrap();
        assert!(Rc::ptr_eq(&first, &third));
    }

    #[test]
    fn install_recovers_bridge_from_retained_attachment() {
        let host = TestHost::new(2);
        let as_container = Rc::clone(&host) as Rc<dyn HostContainer>;

        let first_registry = test_registry();
        let bridge = first_registry.install(&as_container).unwrap();

        // A fresh registry (same process, no entry yet) finds the retained
        // component rather than creating a second authoritative bridge.
        let second_registry = test_registry();
        let found = second_registry.install(&as_container).unwrap();
        assert!(Rc::ptr_eq(&bridge, &found));
    }

    #[test]
    fn unknown_provider_name_fails_loudly() {
        let mut host = TestHost::new(3);
        Rc::get_mut(&mut host)
            .unwrap()
            .metadata
            .insert(PROVIDER_METADATA_KEY.into(), "no-such-provider".into());
        let registry = test_registry();

        let err = registry
            .install(&(host as Rc<dyn HostContainer>))
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::UnknownProvider(name) if name == "no-such-provider"));
    }

    #[test]
    fn stacks_are_created_lazily_and_reused() {
        let host = TestHost::new(4);
        let (_registry, bridge) = installed(&host);

        let first = bridge.get_stack(RenderTargetId(10), None);
        let again = bridge.get_stack(RenderTargetId(10), None);
        let other = bridge.get_stack(RenderTargetId(11), None);

        assert!(Rc::ptr_eq(&first, &again));
        assert!(!Rc::ptr_eq(&first, &other));
        assert_eq!(bridge.stacks().len(), 2);
    }

    #[test]
    fn detached_permission_requests_replay_fifo_exactly_once() {
        let host = TestHost::new(5);
        let registry = test_registry();
        let bridge = registry
            .install(&(Rc::clone(&host) as Rc<dyn HostContainer>))
            .unwrap();

        // Not attached yet: both requests park.
        bridge.request_permissions(&InstanceId::from("R1"), &["camera".into()], 1);
        bridge.request_permissions(&InstanceId::from("R2"), &["location".into()], 2);
        assert!(host.channel.permission_calls.borrow().is_empty());

        bridge.on_host_attach(Rc::clone(&host) as Rc<dyn HostContainer>);
        {
            let calls = host.channel.permission_calls.borrow();
            assert_eq!(calls.len(), 2);
            assert_eq!(calls[0], (vec!["camera".to_string()], 1));
            assert_eq!(calls[1], (vec!["location".to_string()], 2));
        }

        // A later detach/attach cycle must not replay them again.
        bridge.on_host_detach();
        bridge.on_host_attach(Rc::clone(&host) as Rc<dyn HostContainer>);
        assert_eq!(host.channel.permission_calls.borrow().len(), 2);
    }

    #[test]
    fn attached_permission_request_forwards_immediately() {
        let host = TestHost::new(6);
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = logging_registry(&log);
        let bridge = registry
            .install(&(Rc::clone(&host) as Rc<dyn HostContainer>))
            .unwrap();
        bridge.on_host_attach(Rc::clone(&host) as Rc<dyn HostContainer>);
        bridge.get_stack(RenderTargetId(1), None);

        bridge.request_permissions(&InstanceId::from("R1"), &["camera".into()], 9);
        assert_eq!(host.channel.permission_calls.borrow().len(), 1);

        // The code routes grants back with the requester id attached.
        bridge.on_permission_result(9, &["camera".into()], &[true]);
        assert_eq!(*log.borrow(), vec!["t1:grants:R1:9:[true]".to_string()]);
    }

    #[test]
    fn results_fan_out_to_every_stack() {
        let host = TestHost::new(7);
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = logging_registry(&log);
        let bridge = registry
            .install(&(Rc::clone(&host) as Rc<dyn HostContainer>))
            .unwrap();
        bridge.on_host_attach(Rc::clone(&host) as Rc<dyn HostContainer>);
        bridge.get_stack(RenderTargetId(1), None);
        bridge.get_stack(RenderTargetId(2), None);

        bridge.register_for_result(&InstanceId::from("R1"), 42);
        bridge.on_activity_result(42, 0, None);

        // Every stack sees the delivery, tagged with the originating
        // requester; a stale code produces nothing.
        bridge.on_activity_result(999, 0, None);
        assert_eq!(
            *log.borrow(),
            vec![
                "t1:result:R1:42:0".to_string(),
                "t2:result:R1:42:0".to_string(),
            ]
        );
    }

    #[test]
    fn unregister_clears_all_codes_for_requester() {
        let host = TestHost::new(8);
        let (_registry, bridge) = installed(&host);

        bridge.register_for_result(&InstanceId::from("R1"), 1);
        bridge.register_for_result(&InstanceId::from("R1"), 2);
        bridge.register_for_result(&InstanceId::from("R2"), 3);
        bridge.unregister_for_results(&InstanceId::from("R1"));

        assert_eq!(bridge.result_codes.borrow().len(), 1);
        assert_eq!(
            bridge.result_codes.borrow().get(&3),
            Some(&InstanceId::from("R2"))
        );
    }

    #[test]
    fn start_for_result_registers_then_forwards() {
        let host = TestHost::new(9);
        let (_registry, bridge) = installed(&host);

        bridge.start_for_result(
            &InstanceId::from("R1"),
            &HostRequest::new("pick-photo"),
            17,
            None,
        );

        assert_eq!(
            *host.channel.started.borrow(),
            vec![("pick-photo".to_string(), 17)]
        );
        assert_eq!(
            bridge.result_codes.borrow().get(&17),
            Some(&InstanceId::from("R1"))
        );

        bridge.start(&HostRequest::new("open-settings"));
        assert_eq!(
            *host.channel.fire_and_forget.borrow(),
            vec!["open-settings".to_string()]
        );
        bridge.invalidate_menu();
        assert_eq!(host.channel.invalidations.get(), 1);
    }

    #[test]
    fn bookkeeping_round_trip() {
        let host = TestHost::new(10);
        let registry = test_registry();
        let bridge = registry
            .install(&(Rc::clone(&host) as Rc<dyn HostContainer>))
            .unwrap();

        bridge.register_for_result(&InstanceId::from("R1"), 42);
        bridge.request_permissions(&InstanceId::from("R2"), &["camera".into()], 7);

        let mut saved = StateContainer::new();
        bridge.save_state(&mut saved).unwrap();

        let restored_host = TestHost::new(11);
        let restored_registry = test_registry();
        let restored = restored_registry
            .install(&(restored_host as Rc<dyn HostContainer>))
            .unwrap();
        restored.restore_state(&saved);

        assert_eq!(
            *restored.result_codes.borrow(),
            *bridge.result_codes.borrow()
        );
        assert_eq!(
            *restored.permission_codes.borrow(),
            *bridge.permission_codes.borrow()
        );
        assert_eq!(
            *restored.pending_permissions.borrow(),
            *bridge.pending_permissions.borrow()
        );
    }

    #[test]
    fn final_destroy_is_idempotent_and_unregisters() {
        let host = TestHost::new(12);
        let (registry, bridge) = installed(&host);
        bridge.get_stack(RenderTargetId(1), None);
        assert_eq!(registry.active_count(), 1);

        bridge.on_host_detach();
        bridge.on_host_destroy_final();
        bridge.on_host_destroy_final();

        assert_eq!(registry.active_count(), 0);
        assert_eq!(bridge.host_id(), None);
        assert!(bridge.stacks().is_empty());
    }

    #[test]
    fn detach_notifies_stacks_once_per_cycle() {
        let host = TestHost::new(13);
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = logging_registry(&log);
        let bridge = registry
            .install(&(Rc::clone(&host) as Rc<dyn HostContainer>))
            .unwrap();
        bridge.on_host_attach(Rc::clone(&host) as Rc<dyn HostContainer>);
        bridge.get_stack(RenderTargetId(1), None);

        bridge.on_host_detach();
        bridge.on_host_detach();
        assert!(bridge.is_destroyed());
        assert_eq!(*log.borrow(), vec!["t1:destroyed:host:13".to_string()]);

        // Reattach resets the latch; the next detach notifies again.
        bridge.on_host_attach(Rc::clone(&host) as Rc<dyn HostContainer>);
        assert!(!bridge.is_destroyed());
        bridge.on_host_detach();
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn lifecycle_passthroughs_check_host_identity() {
        let host = TestHost::new(14);
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = logging_registry(&log);
        let bridge = registry
            .install(&(Rc::clone(&host) as Rc<dyn HostContainer>))
            .unwrap();
        bridge.on_host_attach(Rc::clone(&host) as Rc<dyn HostContainer>);
        bridge.get_stack(RenderTargetId(1), None);

        bridge.on_host_started(HostId(14));
        bridge.on_host_started(HostId(999));
        bridge.on_host_resumed(HostId(14));
        bridge.on_host_paused(HostId(14));
        bridge.on_host_stopped(HostId(14));

        // Events for a foreign host never reach the stacks.
        assert_eq!(
            *log.borrow(),
            vec![
                "t1:started:host:14".to_string(),
                "t1:resumed:host:14".to_string(),
                "t1:paused:host:14".to_string(),
                "t1:stopped:host:14".to_string(),
            ]
        );
    }

    #[test]
    fn menu_selection_short_circuits() {
        let host = TestHost::new(15);
        let registry = BridgeRegistry::new(|_bridge, target| {
            let mut stack = TestStack::default();
            stack.menu_title = Some(format!("item-{}", target.0));
            if target.0 == 2 {
                stack.claims_item = Some(MenuItemId(0));
            }
            Rc::new(RefCell::new(stack)) as Rc<RefCell<dyn NavigationStack>>
        });
        let bridge = registry
            .install(&(Rc::clone(&host) as Rc<dyn HostContainer>))
            .unwrap();
        bridge.on_host_attach(Rc::clone(&host) as Rc<dyn HostContainer>);
        bridge.get_stack(RenderTargetId(1), None);
        bridge.get_stack(RenderTargetId(2), None);

        let mut menu = Menu::new();
        bridge.build_menu(&mut menu);
        assert_eq!(menu.items().len(), 2);

        assert!(bridge.menu_item_selected(MenuItemId(0)));
        assert!(!bridge.menu_item_selected(MenuItemId(99)));
    }

    #[test]
    fn rationale_query_is_tri_state() {
        let host = TestHost::new(16);
        let registry = BridgeRegistry::new(|_bridge, target| {
            let mut stack = TestStack::default();
            stack.rationale = match target.0 {
                1 => None,
                _ => Some(false),
            };
            Rc::new(RefCell::new(stack)) as Rc<RefCell<dyn NavigationStack>>
        });
        let bridge = registry
            .install(&(Rc::clone(&host) as Rc<dyn HostContainer>))
            .unwrap();

        // No stacks yet: nobody claims the permission.
        assert_eq!(bridge.should_show_permission_rationale("camera"), None);

        bridge.get_stack(RenderTargetId(1), None);
        assert_eq!(bridge.should_show_permission_rationale("camera"), None);

        // Second stack explicitly declines; that is distinct from "nobody".
        bridge.get_stack(RenderTargetId(2), None);
        assert_eq!(bridge.should_show_permission_rationale("camera"), Some(false));
    }

    #[test]
    fn stack_restore_uses_per_target_sub_record() {
        let host = TestHost::new(17);
        let registry = BridgeRegistry::new(|_bridge, _target| {
            let mut stack = TestStack::default();
            stack.saved_marker = Some("original".into());
            Rc::new(RefCell::new(stack)) as Rc<RefCell<dyn NavigationStack>>
        });
        let bridge = registry
            .install(&(Rc::clone(&host) as Rc<dyn HostContainer>))
            .unwrap();
        bridge.get_stack(RenderTargetId(3), None);

        let mut saved = StateContainer::new();
        bridge.save_stack_states(&mut saved).unwrap();
        assert!(saved.contains(&stack_state_key(RenderTargetId(3))));

        // A recreated bridge hands the sub-record to the new stack.
        let host2 = TestHost::new(18);
        let registry2 = test_registry();
        let bridge2 = registry2
            .install(&(Rc::clone(&host2) as Rc<dyn HostContainer>))
            .unwrap();
        bridge2.get_stack(RenderTargetId(3), Some(&saved));
        let mut check = StateContainer::new();
        bridge2.save_stack_states(&mut check).unwrap();
        let sub = check.child(&stack_state_key(RenderTargetId(3))).unwrap();
        assert_eq!(sub.get::<String>("marker"), Some("original".into()));
    }
}
