//! Built-in transition handlers.

use std::cell::RefCell;
use std::rc::Rc;

use crate::host::RenderSurface;
use crate::ids::ViewHandle;
use crate::transition::{CompletionSink, TransitionHandler};

/// The default handler: detach the outgoing view, attach the incoming one,
/// complete synchronously. No animation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleSwapHandler;

impl SimpleSwapHandler {
    pub const TAG: &'static str = "simple-swap";

    pub fn new() -> Self {
        Self
    }
}

impl TransitionHandler for SimpleSwapHandler {
    fn tag(&self) -> &'static str {
        Self::TAG
    }

    fn perform_change(
        &mut self,
        container: &Rc<RefCell<dyn RenderSurface>>,
        from: Option<ViewHandle>,
        to: Option<ViewHandle>,
        is_push: bool,
        done: CompletionSink,
    ) {
        {
            let mut surface = container.borrow_mut();
            if let Some(from) = from {
                if !is_push || self.removes_from_view_on_push() {
                    surface.detach(from);
                }
            }
            if let Some(to) = to {
                if !surface.contains(to) {
                    surface.attach(to);
                }
            }
        }
        done.complete();
    }

    // Always completes within perform_change; nothing is ever pending.
    fn complete_immediately(&mut self) {}
}
