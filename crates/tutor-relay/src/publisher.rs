use std::sync::Arc;

use tracing::{debug, warn};

use tutor_types::events::RelayEvent;

use crate::dispatcher::Dispatcher;
use crate::hosted::HostedRelay;

/// Fire-and-forget publishing to every configured relay.
///
/// `publish` never blocks on the network and never reports failure: local
/// delivery is a broadcast send, and the hosted relay call runs on its own
/// task whose errors are only logged.
#[derive(Clone)]
pub struct Publisher {
    dispatcher: Dispatcher,
    hosted: Option<Arc<HostedRelay>>,
}

impl Publisher {
    pub fn new(dispatcher: Dispatcher, hosted: Option<Arc<HostedRelay>>) -> Self {
        Self { dispatcher, hosted }
    }

    /// In-process only; used by tests and dev servers.
    pub fn local() -> Self {
        Self::new(Dispatcher::new(), None)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn hosted(&self) -> Option<&Arc<HostedRelay>> {
        self.hosted.as_ref()
    }

    pub fn publish(&self, channel: &str, event: RelayEvent) {
        debug!("Publishing {} on {}", event.name(), channel);

        if let Some(hosted) = &self.hosted {
            let hosted = hosted.clone();
            let channel = channel.to_string();
            let hosted_event = event.clone();
            tokio::spawn(async move {
                if let Err(e) = hosted.trigger(&channel, &hosted_event).await {
                    warn!("Hosted relay publish of {} on {} failed: {}", hosted_event.name(), channel, e);
                }
            });
        }

        self.dispatcher.publish(channel, event);
    }
}
