use crate::host::TabId;

use super::messages::Request;

/// Everything the timer reacts to, in arrival order. Produced by the host connection, consumed
/// one at a time by [super::EventLoop].
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// The extension was installed or updated.
    Installed,
    TabActivated { tab_id: TabId },
    /// A tab finished a navigation or changed state. `url` is only present when it changed.
    TabUpdated { tab_id: TabId, url: Option<String> },
    /// [crate::host::WINDOW_ID_NONE] when the browser lost focus.
    FocusChanged { window_id: i64 },
    AlarmFired { name: String },
    Request { request_id: u64, request: Request },
}
