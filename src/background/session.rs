use std::time::Duration;

use tokio::time::Instant;

use crate::host::TabId;

/// The live accumulation timer. Owning it is what "tracking" means: there is never more than
/// one, and dropping it stops charging time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracking {
    pub domain: String,
    pub name: String,
    pub next_tick: Instant,
}

/// Volatile state of one background process run. Owned by the event loop and lent to each
/// handler; persisted state never lives here.
#[derive(Debug)]
pub struct Session {
    pub active_tab_id: Option<TabId>,
    pub active_tab_url: Option<String>,
    /// False while no browser window has focus.
    pub focused: bool,
    tracking: Option<Tracking>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            active_tab_id: None,
            active_tab_url: None,
            focused: true,
            tracking: None,
        }
    }
}

impl Session {
    pub fn tracking(&self) -> Option<&Tracking> {
        self.tracking.as_ref()
    }

    pub fn is_tracking(&self, domain: &str) -> bool {
        self.tracking.as_ref().is_some_and(|t| t.domain == domain)
    }

    /// Replaces whatever was being tracked.
    pub fn start_tracking(&mut self, tracking: Tracking) {
        self.tracking = Some(tracking);
    }

    /// Safe to call when nothing is tracked.
    pub fn stop_tracking(&mut self) -> Option<Tracking> {
        self.tracking.take()
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.tracking.as_ref().map(|t| t.next_tick)
    }

    /// Moves the deadline of the live timer one interval ahead.
    pub fn advance_tick(&mut self, interval: Duration) {
        if let Some(tracking) = self.tracking.as_mut() {
            tracking.next_tick += interval;
        }
    }
}
