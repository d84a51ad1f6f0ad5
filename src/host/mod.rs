//! Contains the contract between the timer and the browser it runs for.
//! [Browser] covers tabs, the toolbar badge and the page message channel, [AlarmScheduler] the
//! durable timers. [native::NativeHost] realizes both over native messaging,
//! [detached::Detached] stands in when no browser is attached.

pub mod codec;
pub mod detached;
pub mod native;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::background::messages::{PageMessage, Response};

pub type TabId = i64;

/// Browser window id meaning "no window has focus".
pub const WINDOW_ID_NONE: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    /// Absent for tabs the extension may not inspect.
    #[serde(default)]
    pub url: Option<String>,
}

/// A scheduled callback. Fires once after `delay`, then every `period` if set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub delay: Duration,
    pub period: Option<Duration>,
}

impl Alarm {
    pub fn once(delay: Duration) -> Self {
        Self {
            delay,
            period: None,
        }
    }

    pub fn repeating(delay: Duration, period: Duration) -> Self {
        Self {
            delay,
            period: Some(period),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Browser: Send + Sync {
    async fn get_tab(&self, tab_id: TabId) -> Result<Tab>;

    /// Active tab of the focused window.
    async fn active_tab(&self) -> Result<Option<Tab>>;

    async fn reload_tab(&self, tab_id: TabId) -> Result<()>;

    async fn send_to_tab(&self, tab_id: TabId, message: PageMessage) -> Result<()>;

    async fn set_badge_text(&self, tab_id: Option<TabId>, text: String) -> Result<()>;

    async fn set_badge_color(&self, color: String) -> Result<()>;

    /// Answers a page request received as an event.
    async fn respond(&self, request_id: u64, response: Response) -> Result<()>;
}

/// Durable scheduled callbacks. Creating an alarm under an existing name replaces it. Fired
/// alarms come back to the event loop as events carrying their name.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AlarmScheduler: Send + Sync {
    async fn create(&self, name: String, alarm: Alarm) -> Result<()>;

    async fn clear(&self, name: String) -> Result<()>;
}
