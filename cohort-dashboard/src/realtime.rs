//! Realtime event hub and the WebSocket feed that fills it.

use crate::config::ReconnectConfig;
use crate::subscriptions::Subscription;
use chrono::{DateTime, Utc};
use cohort_core::{CommunityId, UserId};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Default hub buffer before slow listeners start lagging.
pub const DEFAULT_HUB_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    FeedConnected,
    FeedDisconnected {
        reason: String,
    },
    CommunityUpdated {
        community_id: CommunityId,
    },
    MemberJoined {
        community_id: CommunityId,
        user_id: UserId,
    },
    SessionScheduled {
        community_id: CommunityId,
        mentor_id: UserId,
        student_id: UserId,
        starts_at: DateTime<Utc>,
    },
    AnalyticsChanged {
        community_id: CommunityId,
    },
}

impl RealtimeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::FeedConnected => "feed_connected",
            Self::FeedDisconnected { .. } => "feed_disconnected",
            Self::CommunityUpdated { .. } => "community_updated",
            Self::MemberJoined { .. } => "member_joined",
            Self::SessionScheduled { .. } => "session_scheduled",
            Self::AnalyticsChanged { .. } => "analytics_changed",
        }
    }

    pub fn community_id(&self) -> Option<&CommunityId> {
        match self {
            Self::CommunityUpdated { community_id }
            | Self::MemberJoined { community_id, .. }
            | Self::SessionScheduled { community_id, .. }
            | Self::AnalyticsChanged { community_id } => Some(community_id),
            Self::FeedConnected | Self::FeedDisconnected { .. } => None,
        }
    }
}

/// Process-wide fan-out of [`RealtimeEvent`]s.
#[derive(Debug, Clone)]
pub struct RealtimeHub {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Deliver to every current listener. Returns how many received it.
    pub fn publish(&self, event: RealtimeEvent) -> usize {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!(event_type, receivers, "Published realtime event");
                receivers
            }
            Err(_) => {
                debug!(event_type, "No listeners for realtime event");
                0
            }
        }
    }

    pub fn receiver(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Run `callback` for every event until the returned handle is dropped.
    ///
    /// The callback may outlive the page that registered it only as long as
    /// the handle does.
    pub fn subscribe<F>(&self, name: impl Into<String>, mut callback: F) -> Subscription
    where
        F: FnMut(RealtimeEvent) + Send + 'static,
    {
        let name = name.into();
        let mut rx = self.tx.subscribe();
        let listener = name.clone();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(subscription = %listener, skipped, "Realtime listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Subscription::new(name, task)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

/// Connection settings for [`spawn_ws_feed`].
#[derive(Debug, Clone)]
pub struct WsFeed {
    pub endpoint: String,
    pub bearer_token: Option<String>,
    pub reconnect: ReconnectConfig,
}

/// Keep a WebSocket connection open and publish decoded events into `hub`,
/// reconnecting with jittered exponential backoff.
pub fn spawn_ws_feed(feed: WsFeed, hub: RealtimeHub) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = feed.reconnect.initial_ms;
        loop {
            match connect(&feed).await {
                Ok(mut stream) => {
                    info!(endpoint = %feed.endpoint, "Realtime feed connected");
                    hub.publish(RealtimeEvent::FeedConnected);
                    backoff = feed.reconnect.initial_ms;

                    let mut reason = "connection closed".to_string();
                    while let Some(message) = stream.next().await {
                        match message {
                            Ok(Message::Text(text)) => {
                                match serde_json::from_str::<RealtimeEvent>(&text) {
                                    Ok(event) => {
                                        hub.publish(event);
                                    }
                                    Err(err) => {
                                        warn!(error = %err, "Realtime decode error");
                                    }
                                }
                            }
                            Ok(Message::Close(_)) => break,
                            Ok(_) => {}
                            Err(err) => {
                                reason = err.to_string();
                                break;
                            }
                        }
                    }

                    warn!(%reason, "Realtime feed disconnected");
                    hub.publish(RealtimeEvent::FeedDisconnected { reason });
                }
                Err(err) => {
                    warn!(error = %err, backoff_ms = backoff, "Realtime feed connect failed");
                }
            }

            let delay = jittered_backoff(backoff, feed.reconnect.jitter_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            backoff = next_backoff(backoff, &feed.reconnect);
        }
    })
}

async fn connect(
    feed: &WsFeed,
) -> Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    tokio_tungstenite::tungstenite::Error,
> {
    let mut request = feed.endpoint.as_str().into_client_request()?;
    if let Some(token) = &feed.bearer_token {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            request.headers_mut().insert(AUTHORIZATION, value);
        }
    }
    let (stream, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

pub fn next_backoff(current_ms: u64, reconnect: &ReconnectConfig) -> u64 {
    let next = (current_ms as f64 * reconnect.multiplier) as u64;
    next.min(reconnect.max_ms)
}

pub fn jittered_backoff(base_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return base_ms;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64;
    let jitter = nanos % jitter_ms;
    base_ms.saturating_add(jitter)
}
