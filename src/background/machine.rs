//! The per-domain time accounting state machine.
//!
//! A domain is never stored with an explicit state. It is derived from its [SiteRecord] and
//! ignore entry (see [SiteState]); every handler applies its transition inside a single
//! [SiteStore::update], so the decision and the write see the same state.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::TimerConfig,
    host::{Alarm, AlarmScheduler, Browser, TabId, WINDOW_ID_NONE},
    utils::{
        clock::Clock,
        time::{date_key, ms_to_minutes, until_next_day},
    },
};

use super::{
    alarms::AlarmName,
    domain,
    error::{SiteError, SiteResult},
    events::HostEvent,
    messages::{PageMessage, Request, Response},
    session::{Session, Tracking},
    storage::{
        entities::{SiteRecord, TimeData},
        site_storage::SiteStore,
    },
};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// An expiry alarm firing while the ignore entry still has longer than this to run belongs to
/// an ignore period that was since renewed.
const EXPIRY_TOLERANCE_MS: i64 = 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteState {
    Unwatched,
    Tracking,
    Blocked,
    Ignored { until: i64 },
}

impl SiteState {
    pub fn of(data: &TimeData, domain: &str, today: &str, now_ms: i64) -> Self {
        let Some(record) = data.sites.get(domain) else {
            return Self::Unwatched;
        };
        if data.is_ignored(domain, now_ms) {
            return Self::Ignored {
                until: data.ignored_until[domain],
            };
        }
        if record.is_stale(today) {
            return Self::Tracking;
        }
        if record.blocked || record.is_exhausted() {
            Self::Blocked
        } else {
            Self::Tracking
        }
    }
}

/// What the tab showing a url deserves, decided while the store is held.
enum Verdict {
    Unwatched,
    Ignored(String),
    Blocked(String, SiteRecord),
    Track(String, SiteRecord),
}

enum Charge {
    Ignored,
    Missing,
    Charged { record: SiteRecord, exhausted: bool },
}

enum Expiry {
    NotIgnored,
    Renewed(i64),
    Expired,
}

pub struct SiteTimer<S, B, A> {
    store: S,
    browser: B,
    alarms: A,
    clock: Box<dyn Clock>,
    config: TimerConfig,
}

impl<S: SiteStore, B: Browser, A: AlarmScheduler> SiteTimer<S, B, A> {
    pub fn new(store: S, browser: B, alarms: A, clock: Box<dyn Clock>, config: TimerConfig) -> Self {
        Self {
            store,
            browser,
            alarms,
            clock,
            config,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    fn today(&self) -> String {
        date_key(self.clock.today())
    }

    /// Dispatches one browser event. Never fails: problems are logged and the event dropped.
    pub async fn handle_event(&self, session: &mut Session, event: HostEvent) {
        match event {
            HostEvent::Installed => {
                if let Err(e) = self.install(session).await {
                    error!("Failed to initialize after install {e:?}");
                }
            }
            HostEvent::TabActivated { tab_id } => {
                session.active_tab_id = Some(tab_id);
                self.check_and_track(session, tab_id).await;
            }
            HostEvent::TabUpdated { tab_id, url } => {
                if session.active_tab_id == Some(tab_id) && url.is_some() {
                    self.check_and_track(session, tab_id).await;
                }
            }
            HostEvent::FocusChanged { window_id } => {
                self.on_focus_changed(session, window_id).await;
            }
            HostEvent::AlarmFired { name } => self.on_alarm(session, &name).await,
            HostEvent::Request {
                request_id,
                request,
            } => {
                let response = self.handle_request(session, request).await;
                if let Err(e) = self.browser.respond(request_id, response).await {
                    warn!("Failed to answer request {request_id} {e:?}");
                }
            }
        }
    }

    pub async fn handle_request(&self, session: &mut Session, request: Request) -> Response {
        debug!("Handling {request:?}");
        match request {
            Request::GetTimeData => match self.time_data().await {
                Ok(data) => Response::TimeData(data),
                Err(e) => {
                    warn!("Failed to read time data {e}");
                    Response::failure(e)
                }
            },
            Request::AddDomain {
                domain,
                name,
                time_limit,
            } => self.add_domain(&domain, name, time_limit).await.into(),
            Request::RemoveDomain { domain } => self.remove_domain(session, &domain).await.into(),
            Request::UpdateDomainTimeLimit { domain, time_limit } => {
                self.update_time_limit(&domain, time_limit).await.into()
            }
            Request::IgnoreDomain { domain } => {
                if let Err(e) = self.ignore_domain(session, &domain).await {
                    warn!("Failed to ignore {domain} {e}");
                }
                Response::success()
            }
            Request::ResetCounters => {
                if let Err(e) = self.reset_counters(session).await {
                    warn!("Failed to reset counters {e}");
                }
                Response::success()
            }
        }
    }

    /// Seeds the default domains that are not monitored yet, then arms alarms.
    pub async fn install(&self, session: &mut Session) -> SiteResult<()> {
        let today = self.today();
        let defaults = &self.config.default_sites;
        let seeded = self
            .store
            .update(|data| {
                let mut seeded = 0;
                for site in defaults {
                    if !data.sites.contains_key(&site.domain) {
                        data.sites.insert(
                            site.domain.clone(),
                            SiteRecord::new(site.name.clone(), site.time_limit, today.clone()),
                        );
                        seeded += 1;
                    }
                }
                seeded
            })
            .await?;
        info!("Installed with {seeded} new default domains");
        self.startup(session).await
    }

    /// Brings persisted state and alarms in line with the wall clock. Alarm deadlines are
    /// recomputed rather than trusted, since the previous process may have died long ago.
    #[instrument(skip_all)]
    pub async fn startup(&self, session: &mut Session) -> SiteResult<()> {
        self.roll_over_stale().await?;

        let until_midnight = until_next_day(self.clock.local());
        self.alarms
            .create(
                AlarmName::ResetDaily.to_string(),
                Alarm::repeating(until_midnight, DAY),
            )
            .await?;
        debug!("Next rollover in {until_midnight:?}");

        let now = self.clock.epoch_ms();
        let ignored = self.store.load().await?.ignored_until;
        for (domain, expires_at) in ignored {
            if expires_at <= now {
                self.expire_ignore(session, &domain).await?;
            } else {
                let delay = Duration::from_millis((expires_at - now) as u64);
                self.alarms
                    .create(AlarmName::IgnoreExpire(domain).to_string(), Alarm::once(delay))
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn time_data(&self) -> SiteResult<TimeData> {
        Ok(self.store.load().await?)
    }

    pub async fn state_of(&self, domain: &str) -> SiteResult<SiteState> {
        let data = self.store.load().await?;
        Ok(SiteState::of(
            &data,
            &domain::normalize(domain),
            &self.today(),
            self.clock.epoch_ms(),
        ))
    }

    pub async fn add_domain(
        &self,
        domain: &str,
        name: Option<String>,
        time_limit: u64,
    ) -> SiteResult<()> {
        let domain = domain::normalize(domain);
        domain::validate(&domain)?;
        if time_limit == 0 {
            return Err(SiteError::InvalidTimeLimit);
        }

        let name = name
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| domain.clone());
        let today = self.today();
        self.store
            .update(|data| {
                if data.sites.contains_key(&domain) {
                    return Err(SiteError::Duplicate);
                }
                data.sites
                    .insert(domain.clone(), SiteRecord::new(name, time_limit, today));
                Ok(())
            })
            .await??;
        info!("Monitoring {domain} with a limit of {time_limit}ms");
        Ok(())
    }

    /// Removing a domain that is not monitored succeeds.
    pub async fn remove_domain(&self, session: &mut Session, domain: &str) -> SiteResult<()> {
        let domain = domain::normalize(domain);
        let removed = self
            .store
            .update(|data| {
                let had_site = data.sites.remove(&domain).is_some();
                let had_ignore = data.ignored_until.remove(&domain).is_some();
                had_site || had_ignore
            })
            .await?;
        if removed {
            info!("Stopped monitoring {domain}");
        }

        if let Err(e) = self
            .alarms
            .clear(AlarmName::IgnoreExpire(domain.clone()).to_string())
            .await
        {
            warn!("Failed to clear expiry alarm of {domain} {e:?}");
        }

        if session.is_tracking(&domain) {
            session.stop_tracking();
            self.show_badge(session.active_tab_id, None).await;
        }
        Ok(())
    }

    pub async fn update_time_limit(&self, domain: &str, time_limit: u64) -> SiteResult<()> {
        if time_limit == 0 {
            return Err(SiteError::InvalidTimeLimit);
        }
        let domain = domain::normalize(domain);
        self.store
            .update(|data| -> SiteResult<()> {
                let record = data.sites.get_mut(&domain).ok_or(SiteError::NotFound)?;
                record.set_time_limit(time_limit);
                Ok(())
            })
            .await??;
        info!("Limit of {domain} is now {time_limit}ms");
        Ok(())
    }

    /// Suspends tracking and blocking of a monitored domain for the ignore duration. Domains
    /// that are not monitored are left alone.
    pub async fn ignore_domain(&self, session: &mut Session, domain: &str) -> SiteResult<()> {
        let domain = domain::normalize(domain);
        let expires_at = self.clock.epoch_ms() + self.config.ignore_duration_ms as i64;
        let monitored = self
            .store
            .update(|data| {
                let Some(record) = data.sites.get_mut(&domain) else {
                    return false;
                };
                record.blocked = false;
                data.ignored_until.insert(domain.clone(), expires_at);
                true
            })
            .await?;
        if !monitored {
            debug!("Not monitoring {domain}, nothing to ignore");
            return Ok(());
        }
        info!("Ignoring {domain} until {expires_at}");

        if let Err(e) = self
            .alarms
            .create(
                AlarmName::IgnoreExpire(domain.clone()).to_string(),
                Alarm::once(self.config.ignore_duration()),
            )
            .await
        {
            warn!("Failed to schedule end of ignore period for {domain} {e:?}");
        }

        if session.is_tracking(&domain) {
            session.stop_tracking();
        }
        self.reload_tabs_showing(&domain).await;
        Ok(())
    }

    /// Ends the ignore period of `domain` and lets the tab showing it block again.
    pub async fn expire_ignore(&self, session: &mut Session, domain: &str) -> SiteResult<()> {
        let now = self.clock.epoch_ms();
        let expiry = self
            .store
            .update(|data| match data.ignored_until.get(domain).copied() {
                None => Expiry::NotIgnored,
                Some(expires_at) if expires_at > now + EXPIRY_TOLERANCE_MS => {
                    Expiry::Renewed(expires_at)
                }
                Some(_) => {
                    data.ignored_until.remove(domain);
                    Expiry::Expired
                }
            })
            .await?;
        match expiry {
            Expiry::NotIgnored => {
                debug!("{domain} is not ignored");
                return Ok(());
            }
            Expiry::Renewed(expires_at) => {
                debug!("Ignore period of {domain} was renewed until {expires_at}");
                return Ok(());
            }
            Expiry::Expired => {}
        }
        info!("Ignore period of {domain} is over");

        if let Some(tab_id) = self.reload_tabs_showing(domain).await {
            if session.focused {
                session.active_tab_id = Some(tab_id);
                self.check_and_track(session, tab_id).await;
            }
        }
        Ok(())
    }

    /// Unconditionally starts a new day for every domain.
    pub async fn reset_counters(&self, session: &mut Session) -> SiteResult<()> {
        let today = self.today();
        self.store
            .update(|data| {
                for record in data.sites.values_mut() {
                    record.reset(&today);
                }
            })
            .await?;
        info!("Counters reset");
        self.recheck_active_tab(session).await;
        Ok(())
    }

    /// Starts a new day for every domain whose counters belong to an earlier one. Running it
    /// again on the same day changes nothing.
    pub async fn roll_over(&self, session: &mut Session) -> SiteResult<()> {
        if self.roll_over_stale().await? {
            self.recheck_active_tab(session).await;
        }
        Ok(())
    }

    async fn roll_over_stale(&self) -> Result<bool> {
        let today = self.today();
        let rolled = self
            .store
            .update(|data| {
                let mut rolled = false;
                for (domain, record) in data.sites.iter_mut() {
                    if record.roll_over(&today) {
                        debug!("New day for {domain}");
                        rolled = true;
                    }
                }
                rolled
            })
            .await?;
        if rolled {
            info!("Rolled over to {today}");
        }
        Ok(rolled)
    }

    async fn on_alarm(&self, session: &mut Session, name: &str) {
        let result = match AlarmName::parse(name) {
            Some(AlarmName::ResetDaily) => self.roll_over(session).await,
            Some(AlarmName::IgnoreExpire(domain)) => self.expire_ignore(session, &domain).await,
            None => {
                warn!("Unknown alarm {name}");
                Ok(())
            }
        };
        if let Err(e) = result {
            error!("Handling alarm {name} failed {e}");
        }
    }

    async fn on_focus_changed(&self, session: &mut Session, window_id: i64) {
        if window_id == WINDOW_ID_NONE {
            debug!("Browser lost focus");
            session.focused = false;
            session.stop_tracking();
            return;
        }
        session.focused = true;
        match self.browser.active_tab().await {
            Ok(Some(tab)) => {
                session.active_tab_id = Some(tab.id);
                self.check_and_track(session, tab.id).await;
            }
            Ok(None) => debug!("Window {window_id} has no active tab"),
            Err(e) => warn!("Failed to query active tab {e:?}"),
        }
    }

    async fn recheck_active_tab(&self, session: &mut Session) {
        if let (true, Some(tab_id)) = (session.focused, session.active_tab_id) {
            self.check_and_track(session, tab_id).await;
        }
    }

    /// Stops the live timer and decides what the tab now showing deserves: a new timer, a block,
    /// or nothing.
    #[instrument(skip(self, session))]
    pub async fn check_and_track(&self, session: &mut Session, tab_id: TabId) {
        session.stop_tracking();

        let tab = match self.browser.get_tab(tab_id).await {
            Ok(tab) => tab,
            Err(e) => {
                warn!("Error getting tab info {e:?}");
                return;
            }
        };
        session.active_tab_url = tab.url.clone();

        let Some(url) = tab.url else {
            self.show_badge(Some(tab_id), None).await;
            return;
        };
        if let Err(e) = self.evaluate(session, tab_id, &url).await {
            warn!("Failed to evaluate {url} {e:?}");
        }
    }

    async fn evaluate(&self, session: &mut Session, tab_id: TabId, url: &str) -> Result<()> {
        let today = self.today();
        let now = self.clock.epoch_ms();
        let verdict = self
            .store
            .update(|data| {
                let Some((domain, _)) = domain::resolve(url, &data.sites) else {
                    return Verdict::Unwatched;
                };
                let domain = domain.to_string();
                if data.is_ignored(&domain, now) {
                    return Verdict::Ignored(domain);
                }
                let Some(record) = data.sites.get_mut(&domain) else {
                    return Verdict::Unwatched;
                };
                record.roll_over(&today);
                if record.is_exhausted() && !record.blocked {
                    // Budget ran out while ignored.
                    record.blocked = true;
                }
                let record = record.clone();
                if record.blocked {
                    Verdict::Blocked(domain, record)
                } else {
                    Verdict::Track(domain, record)
                }
            })
            .await?;

        let (domain, record) = match verdict {
            Verdict::Unwatched => {
                self.show_badge(Some(tab_id), None).await;
                return Ok(());
            }
            Verdict::Ignored(domain) => {
                debug!("{domain} is ignored");
                self.show_badge(Some(tab_id), None).await;
                return Ok(());
            }
            Verdict::Blocked(domain, record) => {
                self.block(tab_id, &domain, &record).await;
                self.show_badge(Some(tab_id), Some(&record)).await;
                return Ok(());
            }
            Verdict::Track(domain, record) => (domain, record),
        };

        debug!("Tracking {domain}");
        session.start_tracking(Tracking {
            name: record.display_name(&domain).to_string(),
            domain,
            next_tick: self.clock.instant() + self.config.tick_interval(),
        });
        self.show_badge(Some(tab_id), Some(&record)).await;
        Ok(())
    }

    /// One accumulation step for the tracked domain. Failures abandon the step and leave the
    /// timer running.
    pub async fn tick(&self, session: &mut Session) {
        let Some(domain) = session.tracking().map(|t| t.domain.clone()) else {
            return;
        };
        if let Err(e) = self.charge(session, &domain).await {
            warn!("Abandoning tick for {domain} {e:?}");
        }
    }

    async fn charge(&self, session: &mut Session, domain: &str) -> Result<()> {
        let today = self.today();
        let now = self.clock.epoch_ms();
        let increment = self.config.tick_increment_ms;
        let charge = self
            .store
            .update(|data| {
                if data.is_ignored(domain, now) {
                    return Charge::Ignored;
                }
                let Some(record) = data.sites.get_mut(domain) else {
                    return Charge::Missing;
                };
                if record.roll_over(&today) {
                    debug!("New day for {domain}");
                }
                let exhausted = record.accumulate(increment, now);
                Charge::Charged {
                    record: record.clone(),
                    exhausted,
                }
            })
            .await?;

        let (record, exhausted) = match charge {
            Charge::Ignored => {
                debug!("{domain} became ignored, stop tracking");
                session.stop_tracking();
                return Ok(());
            }
            Charge::Missing => {
                error!("No data found for domain: {domain}");
                return Ok(());
            }
            Charge::Charged { record, exhausted } => (record, exhausted),
        };

        if exhausted {
            info!("Daily limit reached for {domain}");
            session.stop_tracking();
            if let Some(tab_id) = session.active_tab_id {
                self.block(tab_id, domain, &record).await;
            }
        }
        self.show_badge(session.active_tab_id, Some(&record)).await;
        Ok(())
    }

    async fn block(&self, tab_id: TabId, domain: &str, record: &SiteRecord) {
        let message = PageMessage::BlockSite {
            site: record.display_name(domain).to_string(),
            time_limit: ms_to_minutes(record.time_limit),
        };
        if let Err(e) = self.browser.send_to_tab(tab_id, message).await {
            warn!("Failed to block tab {tab_id} {e:?}");
        }
    }

    /// Remaining minutes for `record`, or an empty badge without one.
    async fn show_badge(&self, tab_id: Option<TabId>, record: Option<&SiteRecord>) {
        let (text, color) = match record {
            Some(record) => {
                let remaining = record.remaining_minutes();
                let color = if remaining < self.config.warning_minutes {
                    &self.config.warning_color
                } else {
                    &self.config.neutral_color
                };
                (remaining.to_string(), Some(color.clone()))
            }
            None => (String::new(), None),
        };
        if let Err(e) = self.browser.set_badge_text(tab_id, text).await {
            debug!("Failed to set badge text {e:?}");
        }
        if let Some(color) = color {
            if let Err(e) = self.browser.set_badge_color(color).await {
                debug!("Failed to set badge color {e:?}");
            }
        }
    }

    /// Reloads the active tab when it shows `domain`, returning its id.
    async fn reload_tabs_showing(&self, domain: &str) -> Option<TabId> {
        let tab = match self.browser.active_tab().await {
            Ok(Some(tab)) => tab,
            Ok(None) => return None,
            Err(e) => {
                debug!("No active tab to reload {e:?}");
                return None;
            }
        };
        if !tab.url.as_deref().is_some_and(|url| url.contains(domain)) {
            return None;
        }
        if let Err(e) = self.browser.reload_tab(tab.id).await {
            warn!("Failed to reload tab {} {e:?}", tab.id);
        }
        Some(tab.id)
    }
}
