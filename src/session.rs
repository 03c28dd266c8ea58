//! Session-scoped services.
//!
//! A [`Session`] owns everything that lives exactly as long as one signed-in
//! user: the push channel, the import poller, the notification log and the
//! event bus they publish on. Changing user means dropping the session and
//! building a new one; dropping it cancels the reconnect task and the poll
//! loop synchronously.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::api::{ApiClient, ApiError};
use crate::bus::EventBus;
use crate::channel::{ChannelConfig, EventChannel, PushTransport, ReconnectPolicy, WsTransport};
use crate::config::SyncConfig;
use crate::metrics::{AnalyticsApi, DashboardLoader};
use crate::notifications::SharedNotificationLog;
use crate::poller::{JobApi, JobStatusPoller, PollerConfig};

/// Identity and credential of the signed-in user.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionContext {
    username: String,
    token: String,
}

impl SessionContext {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// External seams a session is built from.
pub struct SessionParts {
    pub transport: Arc<dyn PushTransport>,
    pub jobs: Arc<dyn JobApi>,
    pub analytics: Arc<dyn AnalyticsApi>,
}

impl SessionParts {
    /// Websocket push plus the REST client for `context`.
    pub fn live(config: &SyncConfig, context: &SessionContext) -> Result<Self, ApiError> {
        let api = Arc::new(ApiClient::from_config(config, Some(context))?);
        Ok(Self {
            transport: Arc::new(WsTransport),
            jobs: api.clone(),
            analytics: api,
        })
    }
}

pub struct Session {
    context: SessionContext,
    bus: Arc<EventBus>,
    notifications: SharedNotificationLog,
    channel: EventChannel,
    poller: JobStatusPoller,
    analytics: Arc<dyn AnalyticsApi>,
}

impl Session {
    pub fn connect(config: &SyncConfig, context: SessionContext) -> Result<Self, ApiError> {
        let parts = SessionParts::live(config, &context)?;
        Ok(Self::with_parts(config, context, parts))
    }

    pub fn with_parts(config: &SyncConfig, context: SessionContext, parts: SessionParts) -> Self {
        let bus = Arc::new(EventBus::new());
        let notifications = SharedNotificationLog::new(Some(bus.clone()));
        let channel = EventChannel::new(
            parts.transport,
            Arc::new(notifications.clone()),
            ChannelConfig {
                url: config.notifications_url(),
                reconnect: ReconnectPolicy::Fixed(config.reconnect_delay()),
                connect_timeout: config.connect_timeout(),
            },
            Some(bus.clone()),
        );
        let poller = JobStatusPoller::new(
            parts.jobs,
            PollerConfig {
                interval: config.poll_interval(),
                max_consecutive_failures: config.poll_max_failures,
            },
            Some(bus.clone()),
        );

        Self {
            context,
            bus,
            notifications,
            channel,
            poller,
            analytics: parts.analytics,
        }
    }

    /// Open the push channel. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        info!(user = %self.context.username(), "starting session");
        self.channel.open(Some(&self.context));
    }

    /// Close the channel and stop any poll loop. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        self.channel.close();
        self.poller.stop();
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn notifications(&self) -> &SharedNotificationLog {
        &self.notifications
    }

    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    pub fn poller(&self) -> &JobStatusPoller {
        &self.poller
    }

    pub fn loader(&self) -> DashboardLoader {
        DashboardLoader::new(self.analytics.clone())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
        info!(user = %self.context.username(), "session closed");
    }
}
