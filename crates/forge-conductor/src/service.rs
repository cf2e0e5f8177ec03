use std::sync::Arc;
use std::time::Duration;

use forge_driver::DriverRegistry;
use forge_store::{InventoryStore, StoreError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::ConductorConfig;
use crate::error::ConductorError;
use crate::manager::ConductorManager;

/// Fleet membership lifecycle for one conductor process.
///
/// `start()` writes the membership row (overwriting a leftover registration
/// from a previous run, which refreshes the advertised driver list) and spawns
/// the keepalive task; `stop()` halts the keepalive and deregisters. Peers
/// determine liveness purely from the heartbeat timestamp.
pub struct ConductorService {
    config: ConductorConfig,
    store: Arc<dyn InventoryStore>,
    registry: Arc<DriverRegistry>,
    heartbeat: Option<JoinHandle<()>>,
}

impl ConductorService {
    pub fn new(
        config: ConductorConfig,
        store: Arc<dyn InventoryStore>,
        registry: Arc<DriverRegistry>,
    ) -> Self {
        ConductorService {
            config,
            store,
            registry,
            heartbeat: None,
        }
    }

    pub fn config(&self) -> &ConductorConfig {
        &self.config
    }

    /// A manager sharing this service's store and registry.
    pub fn manager(&self) -> ConductorManager {
        ConductorManager::new(
            self.config.hostname.clone(),
            self.store.clone(),
            self.registry.clone(),
        )
    }

    pub async fn start(&mut self) -> Result<(), ConductorError> {
        let hostname = self.config.hostname.clone();
        let drivers = self.registry.names();

        if self.config.heartbeat_interval >= self.config.max_time_interval {
            warn!(
                heartbeat = self.config.heartbeat_interval,
                max_time_interval = self.config.max_time_interval,
                "heartbeat interval is not below max_time_interval; peers will see this conductor flap"
            );
        }

        match self.store.register_conductor(&hostname, &drivers).await {
            Ok(_) => {}
            Err(StoreError::ConductorAlreadyRegistered(_)) => {
                warn!(%hostname, "a conductor with this hostname was previously registered; updating registration");
                self.store.unregister_conductor(&hostname).await?;
                self.store.register_conductor(&hostname, &drivers).await?;
            }
            Err(e) => return Err(e.into()),
        }
        info!(%hostname, ?drivers, "conductor registered");

        let store = self.store.clone();
        let period = Duration::from_secs(self.config.heartbeat_interval.max(1));
        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately; registration just stamped
            // the row, so skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = store.touch_conductor(&hostname).await {
                    warn!(%hostname, error = %e, "conductor keepalive failed");
                }
            }
        }));
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), ConductorError> {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        self.store
            .unregister_conductor(&self.config.hostname)
            .await?;
        info!(hostname = %self.config.hostname, "conductor deregistered");
        Ok(())
    }
}
