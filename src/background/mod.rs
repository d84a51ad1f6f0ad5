use std::{future, path::PathBuf};

use anyhow::Result;
use events::HostEvent;
use machine::SiteTimer;
use session::Session;
use storage::site_storage::{JsonFileStore, SiteStore};
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    config::TimerConfig,
    host::{native, AlarmScheduler, Browser},
    utils::clock::{Clock, DefaultClock},
};

pub mod alarms;
pub mod args;
pub mod domain;
pub mod error;
pub mod events;
pub mod machine;
pub mod messages;
pub mod session;
pub mod shutdown;
pub mod storage;

pub const STATE_FILE: &str = "state.json";

/// Represents the starting point for the native messaging host. Talks to the browser over
/// stdin/stdout until either side goes away.
pub async fn start_background(dir: PathBuf) -> Result<()> {
    let config = TimerConfig::load(&dir)?;
    let store = JsonFileStore::new(dir.join(STATE_FILE))?;
    let (host, events) = native::connect(tokio::io::stdin(), tokio::io::stdout());

    let shutdown_token = CancellationToken::new();
    let timer = SiteTimer::new(
        store,
        host.clone(),
        host,
        Box::new(DefaultClock),
        config,
    );
    let event_loop = EventLoop::new(timer, events, shutdown_token.clone());

    let (_, loop_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token),
        event_loop.run(),
    );

    if let Err(loop_result) = loop_result {
        error!("Event loop got an error {:?}", loop_result);
    }

    Ok(())
}

/// Feeds browser events and tick deadlines to the [SiteTimer], one at a time.
pub struct EventLoop<S, B, A> {
    timer: SiteTimer<S, B, A>,
    events: mpsc::UnboundedReceiver<HostEvent>,
    shutdown: CancellationToken,
    session: Session,
}

impl<S: SiteStore, B: Browser, A: AlarmScheduler> EventLoop<S, B, A> {
    pub fn new(
        timer: SiteTimer<S, B, A>,
        events: mpsc::UnboundedReceiver<HostEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            timer,
            events,
            shutdown,
            session: Session::default(),
        }
    }

    /// Executes the event loop. Returns once the browser disconnects or shutdown is requested.
    pub async fn run(mut self) -> Result<()> {
        if let Err(e) = self.timer.startup(&mut self.session).await {
            error!("Startup failed {e}");
        }

        loop {
            let next_tick = self.session.next_tick();
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    break;
                }
                event = self.events.recv() => {
                    let Some(event) = event else {
                        info!("No more browser events");
                        break;
                    };
                    self.timer.handle_event(&mut self.session, event).await;
                }
                _ = wait_for_tick(self.timer.clock(), next_tick) => {
                    self.session.advance_tick(self.timer.config().tick_interval());
                    self.timer.tick(&mut self.session).await;
                }
            }
        }

        self.session.stop_tracking();
        // Lets shutdown detection finish too.
        self.shutdown.cancel();
        Ok(())
    }
}

async fn wait_for_tick(clock: &dyn Clock, deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => clock.sleep_until(deadline).await,
        None => future::pending().await,
    }
}
