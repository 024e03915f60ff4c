use crate::frame::FrameSource;
use crate::notify::Outbox;
use crate::schedule::{Clock, Scheduler};

/// Borrowed view of the monitor's shared resources for one turn.
pub struct Context<'a> {
    pub clock: &'a dyn Clock,
    pub scheduler: &'a mut Scheduler,
    pub camera: Option<&'a mut (dyn FrameSource + 'static)>,
    pub outbox: &'a mut Outbox,
}

impl<'a> Context<'a> {
    pub fn camera(&mut self) -> Option<&mut (dyn FrameSource + 'static)> {
        self.camera.as_deref_mut()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}
