// Zenoh publishers for race events and health

use tracing::info;
use zenoh::pubsub::Publisher;
use zenoh::Session;

use crate::config::{TOPIC_EVENTS, TOPIC_HEALTH};
use crate::messages::{RaceEvent, RaceHealth};

pub struct Telemetry {
    // Publishers are undeclared when the session closes
    _session: Session,
    events: Publisher<'static>,
    health: Publisher<'static>,
}

impl Telemetry {
    pub async fn open() -> zenoh::Result<Self> {
        info!("Opening Zenoh session...");
        let session = zenoh::open(zenoh::Config::default()).await?;
        let events = session.declare_publisher(TOPIC_EVENTS).await?;
        let health = session.declare_publisher(TOPIC_HEALTH).await?;
        info!("Publishing to: {}, {}", TOPIC_EVENTS, TOPIC_HEALTH);

        Ok(Self {
            _session: session,
            events,
            health,
        })
    }

    pub async fn publish_event(&self, event: &RaceEvent) -> zenoh::Result<()> {
        let json = serde_json::to_string(event)?;
        self.events.put(json).await
    }

    pub async fn publish_health(&self, health: RaceHealth) -> zenoh::Result<()> {
        let json = serde_json::to_string(&health)?;
        self.health.put(json).await
    }
}
