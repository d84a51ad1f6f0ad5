use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
};
use tracing::{debug, error, info, warn};

use crate::background::{
    events::HostEvent,
    messages::{PageMessage, Request, Response},
};

use super::{
    codec::{read_message, write_message},
    Alarm, AlarmScheduler, Browser, Tab, TabId,
};

/// Tab lookups that take longer than this are treated as failed reads.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames the extension shim sends to the host.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum Incoming {
    Installed,
    TabActivated {
        tab_id: TabId,
    },
    TabUpdated {
        tab_id: TabId,
        #[serde(default)]
        url: Option<String>,
    },
    FocusChanged {
        window_id: i64,
    },
    Alarm {
        name: String,
    },
    /// `message` is decoded separately so a malformed one can still be answered.
    Request {
        request_id: u64,
        message: serde_json::Value,
    },
    TabReply {
        request_id: u64,
        #[serde(default)]
        tab: Option<Tab>,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Frames the host sends to the extension shim.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum Outgoing {
    GetTab {
        request_id: u64,
        tab_id: TabId,
    },
    QueryActiveTab {
        request_id: u64,
    },
    ReloadTab {
        tab_id: TabId,
    },
    SendToTab {
        tab_id: TabId,
        message: PageMessage,
    },
    SetBadgeText {
        tab_id: Option<TabId>,
        text: String,
    },
    SetBadgeColor {
        color: String,
    },
    CreateAlarm {
        name: String,
        delay_in_minutes: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        period_in_minutes: Option<f64>,
    },
    ClearAlarm {
        name: String,
    },
    Response {
        request_id: u64,
        response: Response,
    },
}

struct TabReply {
    tab: Option<Tab>,
    error: Option<String>,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<TabReply>>>>;

/// Browser connection over native messaging. Cheap to clone; all clones share one pipe.
#[derive(Clone)]
pub struct NativeHost {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    pending: Pending,
    next_request: Arc<AtomicU64>,
}

/// Starts the reader and writer tasks on the given pipe. The returned receiver yields browser
/// events and closes once the browser disconnects. It is unbounded: the reader must never wait
/// on the event loop, which may itself be waiting for a tab reply further down the pipe.
pub fn connect<R, W>(
    reader: R,
    writer: W,
) -> (NativeHost, mpsc::UnboundedReceiver<HostEvent>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outgoing, outgoing_receiver) = mpsc::unbounded_channel();
    let (events, event_receiver) = mpsc::unbounded_channel();
    let pending = Pending::default();

    tokio::spawn(write_loop(writer, outgoing_receiver));
    tokio::spawn(read_loop(reader, events, outgoing.clone(), pending.clone()));

    (
        NativeHost {
            outgoing,
            pending,
            next_request: Arc::new(AtomicU64::new(1)),
        },
        event_receiver,
    )
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) {
    while let Some(frame) = outgoing.recv().await {
        debug!("Sending {:?}", frame);
        if let Err(e) = write_message(&mut writer, &frame).await {
            error!("Failed to write frame {e:?}");
            break;
        }
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    events: mpsc::UnboundedSender<HostEvent>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    pending: Pending,
) {
    loop {
        let frame = match read_message::<serde_json::Value, _>(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Browser closed the connection");
                break;
            }
            Err(e) => {
                error!("Unreadable frame, closing connection {e:?}");
                break;
            }
        };

        let incoming = match serde_json::from_value::<Incoming>(frame.clone()) {
            Ok(incoming) => incoming,
            Err(e) => {
                warn!("Ignoring unknown message {frame}: {e}");
                continue;
            }
        };

        let event = match incoming {
            Incoming::TabReply {
                request_id,
                tab,
                error,
            } => {
                let waiter = pending
                    .lock()
                    .map_err(|_| anyhow!("pending replies poisoned"))
                    .map(|mut v| v.remove(&request_id));
                match waiter {
                    Ok(Some(waiter)) => {
                        let _ = waiter.send(TabReply { tab, error });
                    }
                    Ok(None) => warn!("Reply for unknown request {request_id}"),
                    Err(e) => error!("{e}"),
                }
                continue;
            }
            Incoming::Installed => HostEvent::Installed,
            Incoming::TabActivated { tab_id } => HostEvent::TabActivated { tab_id },
            Incoming::TabUpdated { tab_id, url } => HostEvent::TabUpdated { tab_id, url },
            Incoming::FocusChanged { window_id } => HostEvent::FocusChanged { window_id },
            Incoming::Alarm { name } => HostEvent::AlarmFired { name },
            Incoming::Request {
                request_id,
                message,
            } => match serde_json::from_value::<Request>(message) {
                Ok(request) => HostEvent::Request {
                    request_id,
                    request,
                },
                Err(e) => {
                    warn!("Rejecting request {request_id}: {e}");
                    let reply = Outgoing::Response {
                        request_id,
                        response: Response::failure(format!("Invalid request: {e}")),
                    };
                    if outgoing.send(reply).is_err() {
                        debug!("Writer is gone, cannot answer {request_id}");
                    }
                    continue;
                }
            },
        };

        if events.send(event).is_err() {
            debug!("Event loop is gone, stop reading");
            break;
        }
    }

    // Fails every lookup still waiting for an answer.
    if let Ok(mut pending) = pending.lock() {
        pending.clear();
    }
}

impl NativeHost {
    fn send(&self, frame: Outgoing) -> Result<()> {
        self.outgoing
            .send(frame)
            .map_err(|_| anyhow!("Browser connection is closed"))
    }

    async fn ask(&self, build: impl FnOnce(u64) -> Outgoing) -> Result<Option<Tab>> {
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| anyhow!("pending replies poisoned"))?
            .insert(request_id, sender);

        if let Err(e) = self.send(build(request_id)) {
            self.forget(request_id);
            return Err(e);
        }

        let reply = match tokio::time::timeout(REPLY_TIMEOUT, receiver).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => bail!("Browser disconnected before answering request {request_id}"),
            Err(_) => {
                self.forget(request_id);
                bail!("Browser did not answer request {request_id} in time");
            }
        };
        match reply.error {
            Some(error) => bail!("Browser failed request {request_id}: {error}"),
            None => Ok(reply.tab),
        }
    }

    fn forget(&self, request_id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&request_id);
        }
    }
}

#[async_trait]
impl Browser for NativeHost {
    async fn get_tab(&self, tab_id: TabId) -> Result<Tab> {
        self.ask(|request_id| Outgoing::GetTab { request_id, tab_id })
            .await?
            .ok_or_else(|| anyhow!("Tab {tab_id} does not exist"))
    }

    async fn active_tab(&self) -> Result<Option<Tab>> {
        self.ask(|request_id| Outgoing::QueryActiveTab { request_id })
            .await
    }

    async fn reload_tab(&self, tab_id: TabId) -> Result<()> {
        self.send(Outgoing::ReloadTab { tab_id })
    }

    async fn send_to_tab(&self, tab_id: TabId, message: PageMessage) -> Result<()> {
        self.send(Outgoing::SendToTab { tab_id, message })
    }

    async fn set_badge_text(&self, tab_id: Option<TabId>, text: String) -> Result<()> {
        self.send(Outgoing::SetBadgeText { tab_id, text })
    }

    async fn set_badge_color(&self, color: String) -> Result<()> {
        self.send(Outgoing::SetBadgeColor { color })
    }

    async fn respond(&self, request_id: u64, response: Response) -> Result<()> {
        self.send(Outgoing::Response {
            request_id,
            response,
        })
    }
}

fn as_minutes(duration: Duration) -> f64 {
    duration.as_secs_f64() / 60.
}

#[async_trait]
impl AlarmScheduler for NativeHost {
    async fn create(&self, name: String, alarm: Alarm) -> Result<()> {
        self.send(Outgoing::CreateAlarm {
            name,
            delay_in_minutes: as_minutes(alarm.delay),
            period_in_minutes: alarm.period.map(as_minutes),
        })
    }

    async fn clear(&self, name: String) -> Result<()> {
        self.send(Outgoing::ClearAlarm { name })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use serde_json::{json, Value};
    use tokio::io::{duplex, split, DuplexStream};

    use crate::{
        background::{
            events::HostEvent,
            messages::{Request, Response},
        },
        host::{
            codec::{read_message, write_message},
            Alarm, AlarmScheduler, Browser, Tab,
        },
    };

    use super::{connect, NativeHost};

    fn start() -> (
        NativeHost,
        tokio::sync::mpsc::UnboundedReceiver<HostEvent>,
        DuplexStream,
    ) {
        let (host_end, browser_end) = duplex(64 * 1024);
        let (reader, writer) = split(host_end);
        let (host, events) = connect(reader, writer);
        (host, events, browser_end)
    }

    async fn next_frame(browser: &mut DuplexStream) -> Result<Value> {
        read_message::<Value, _>(browser)
            .await?
            .ok_or_else(|| anyhow::anyhow!("host closed the pipe"))
    }

    #[tokio::test]
    async fn test_browser_events_are_forwarded() -> Result<()> {
        let (_host, mut events, mut browser) = start();

        write_message(&mut browser, &json!({"type": "tabActivated", "tabId": 3})).await?;
        write_message(&mut browser, &json!({"type": "somethingNew"})).await?;
        write_message(
            &mut browser,
            &json!({"type": "request", "requestId": 9, "message": {"action": "GET_TIME_DATA"}}),
        )
        .await?;
        write_message(&mut browser, &json!({"type": "focusChanged", "windowId": -1})).await?;

        assert_eq!(events.recv().await, Some(HostEvent::TabActivated { tab_id: 3 }));
        assert_eq!(
            events.recv().await,
            Some(HostEvent::Request {
                request_id: 9,
                request: Request::GetTimeData
            })
        );
        assert_eq!(
            events.recv().await,
            Some(HostEvent::FocusChanged { window_id: -1 })
        );

        drop(browser);
        assert_eq!(events.recv().await, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_tab_lookup_waits_for_matching_reply() -> Result<()> {
        let (host, _events, mut browser) = start();

        let lookup = tokio::spawn({
            let host = host.clone();
            async move { host.get_tab(7).await }
        });

        let request = next_frame(&mut browser).await?;
        assert_eq!(request["type"], "getTab");
        assert_eq!(request["tabId"], 7);
        let request_id = request["requestId"].as_u64().unwrap();

        write_message(
            &mut browser,
            &json!({"type": "tabReply", "requestId": request_id + 100, "tab": null}),
        )
        .await?;
        write_message(
            &mut browser,
            &json!({
                "type": "tabReply",
                "requestId": request_id,
                "tab": {"id": 7, "url": "https://x.com/"}
            }),
        )
        .await?;

        assert_eq!(
            lookup.await??,
            Tab {
                id: 7,
                url: Some("https://x.com/".into())
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_requests_are_answered() -> Result<()> {
        let (_host, mut events, mut browser) = start();

        write_message(
            &mut browser,
            &json!({
                "type": "request",
                "requestId": 5,
                "message": {"action": "ADD_DOMAIN", "domain": "x.com", "timeLimit": -60000}
            }),
        )
        .await?;
        write_message(
            &mut browser,
            &json!({"type": "request", "requestId": 6, "message": {"action": "UPDATE_TIME_LIMIT"}}),
        )
        .await?;
        write_message(&mut browser, &json!({"type": "tabActivated", "tabId": 2})).await?;

        for request_id in [5, 6] {
            let frame = next_frame(&mut browser).await?;
            assert_eq!(frame["type"], "response");
            assert_eq!(frame["requestId"], request_id);
            assert_eq!(frame["response"]["success"], false);
            assert!(frame["response"]["error"]
                .as_str()
                .unwrap()
                .starts_with("Invalid request"));
        }
        // Neither reached the event loop.
        assert_eq!(events.recv().await, Some(HostEvent::TabActivated { tab_id: 2 }));
        Ok(())
    }

    #[tokio::test]
    async fn test_tab_reply_behind_many_events() -> Result<()> {
        let (host, mut events, mut browser) = start();

        let lookup = tokio::spawn({
            let host = host.clone();
            async move { host.get_tab(1).await }
        });
        let request = next_frame(&mut browser).await?;

        for _ in 0..70 {
            write_message(
                &mut browser,
                &json!({"type": "tabUpdated", "tabId": 4, "url": "https://x.com/"}),
            )
            .await?;
        }
        write_message(
            &mut browser,
            &json!({
                "type": "tabReply",
                "requestId": request["requestId"],
                "tab": {"id": 1, "url": "https://y.com/"}
            }),
        )
        .await?;

        let started = tokio::time::Instant::now();
        assert_eq!(lookup.await??.id, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        for _ in 0..70 {
            assert!(matches!(
                events.try_recv(),
                Ok(HostEvent::TabUpdated { tab_id: 4, .. })
            ));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_tab_lookup_errors() -> Result<()> {
        let (host, _events, mut browser) = start();

        let lookup = tokio::spawn({
            let host = host.clone();
            async move { host.active_tab().await }
        });
        let request = next_frame(&mut browser).await?;
        assert_eq!(request["type"], "queryActiveTab");
        write_message(
            &mut browser,
            &json!({"type": "tabReply", "requestId": request["requestId"], "error": "No tab"}),
        )
        .await?;
        assert!(lookup.await?.is_err());

        let lookup = tokio::spawn({
            let host = host.clone();
            async move { host.get_tab(1).await }
        });
        next_frame(&mut browser).await?;
        drop(browser);
        assert!(lookup.await?.is_err());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_lookup_times_out() -> Result<()> {
        let (host, _events, _browser) = start();
        let started = tokio::time::Instant::now();
        assert!(host.get_tab(1).await.is_err());
        assert!(started.elapsed() >= Duration::from_secs(5));
        Ok(())
    }

    #[tokio::test]
    async fn test_commands_wire_format() -> Result<()> {
        let (host, _events, mut browser) = start();

        host.create(
            "resetDaily".into(),
            Alarm::repeating(Duration::from_secs(90), Duration::from_secs(24 * 60 * 60)),
        )
        .await?;
        host.clear("ignoreExpire_x.com".into()).await?;
        host.respond(4, Response::failure("Domain already exists"))
            .await?;
        host.set_badge_text(Some(2), "5".into()).await?;

        assert_eq!(
            next_frame(&mut browser).await?,
            json!({
                "type": "createAlarm",
                "name": "resetDaily",
                "delayInMinutes": 1.5,
                "periodInMinutes": 1440.0
            })
        );
        assert_eq!(
            next_frame(&mut browser).await?,
            json!({"type": "clearAlarm", "name": "ignoreExpire_x.com"})
        );
        assert_eq!(
            next_frame(&mut browser).await?,
            json!({
                "type": "response",
                "requestId": 4,
                "response": {"success": false, "error": "Domain already exists"}
            })
        );
        assert_eq!(
            next_frame(&mut browser).await?,
            json!({"type": "setBadgeText", "tabId": 2, "text": "5"})
        );
        Ok(())
    }
}
