use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::background::messages::{PageMessage, Response};

use super::{Alarm, AlarmScheduler, Browser, Tab, TabId};

/// Host used when the timer runs without a browser, e.g. from the CLI. There are no tabs to
/// inspect and nothing to draw on. Alarms are dropped: the background process re-arms every
/// alarm from persisted state when it starts.
pub struct Detached;

#[async_trait]
impl Browser for Detached {
    async fn get_tab(&self, tab_id: TabId) -> Result<Tab> {
        bail!("No browser attached to look up tab {tab_id}")
    }

    async fn active_tab(&self) -> Result<Option<Tab>> {
        Ok(None)
    }

    async fn reload_tab(&self, _tab_id: TabId) -> Result<()> {
        Ok(())
    }

    async fn send_to_tab(&self, tab_id: TabId, message: PageMessage) -> Result<()> {
        debug!("Dropping {message:?} for tab {tab_id}");
        Ok(())
    }

    async fn set_badge_text(&self, _tab_id: Option<TabId>, _text: String) -> Result<()> {
        Ok(())
    }

    async fn set_badge_color(&self, _color: String) -> Result<()> {
        Ok(())
    }

    async fn respond(&self, _request_id: u64, _response: Response) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AlarmScheduler for Detached {
    async fn create(&self, name: String, alarm: Alarm) -> Result<()> {
        debug!("Deferring alarm {name} {alarm:?} to the next host start");
        Ok(())
    }

    async fn clear(&self, name: String) -> Result<()> {
        debug!("Deferring removal of alarm {name} to the next host start");
        Ok(())
    }
}
