//! The price node: wires providers into a service and runs the prewarmer.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, instrument};

use quotedesk_pricing::{
    CoinGeckoProvider, CoinbaseProvider, MetricsSnapshot, PriceProvider, PriceService, Prewarmer,
    PrewarmerHandle,
};

use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::state::NodeState;

/// Build the configured providers in priority order.
pub fn build_providers(config: &NodeConfig) -> NodeResult<Vec<Arc<dyn PriceProvider>>> {
    let timeout = config.pricing.request_timeout;

    config
        .providers
        .iter()
        .map(|name| -> NodeResult<Arc<dyn PriceProvider>> {
            match name.as_str() {
                "coinbase" => Ok(Arc::new(CoinbaseProvider::new(&config.coinbase_url, timeout)?)),
                "coingecko" => Ok(Arc::new(CoinGeckoProvider::new(
                    &config.coingecko_url,
                    timeout,
                )?)),
                other => Err(NodeError::Configuration(format!("Unknown provider '{other}'"))),
            }
        })
        .collect()
}

/// A running price node.
pub struct QuoteNode {
    node_id: String,
    state: RwLock<NodeState>,
    service: PriceService,
    prewarmer: Prewarmer,
    prewarm_handle: Mutex<Option<PrewarmerHandle>>,
}

impl QuoteNode {
    /// Create a node backed by the providers named in `config`.
    pub fn new(config: NodeConfig, node_id: String) -> NodeResult<Self> {
        config.validate().map_err(NodeError::Configuration)?;
        let providers = build_providers(&config)?;
        Self::with_providers(config, node_id, providers)
    }

    /// Create a node backed by explicit providers.
    pub fn with_providers(
        config: NodeConfig,
        node_id: String,
        providers: Vec<Arc<dyn PriceProvider>>,
    ) -> NodeResult<Self> {
        let service = PriceService::new(providers, config.pricing)?;
        let prewarmer = Prewarmer::new(service.clone(), config.prewarm);

        Ok(Self {
            node_id,
            state: RwLock::new(NodeState::Starting),
            service,
            prewarmer,
            prewarm_handle: Mutex::new(None),
        })
    }

    /// Start refreshing warm pairs.
    #[instrument(skip(self), fields(node_id = %self.node_id))]
    pub fn start(&self) -> NodeResult<()> {
        {
            let mut state = self.state.write();
            if *state != NodeState::Starting {
                return Err(NodeError::InvalidState {
                    action: "start",
                    state: *state,
                });
            }
            *state = NodeState::Running;
        }

        *self.prewarm_handle.lock() = Some(self.prewarmer.spawn());

        info!(warm_pairs = self.prewarmer.pairs().len(), "Node started");
        Ok(())
    }

    /// Stop the prewarmer and return the final counters.
    #[instrument(skip(self), fields(node_id = %self.node_id))]
    pub async fn stop(&self) -> NodeResult<MetricsSnapshot> {
        {
            let mut state = self.state.write();
            if *state != NodeState::Running {
                return Err(NodeError::InvalidState {
                    action: "stop",
                    state: *state,
                });
            }
            *state = NodeState::ShuttingDown;
        }
        info!("Stopping node");

        let handle = self.prewarm_handle.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }

        *self.state.write() = NodeState::Stopped;

        let metrics = self.service.metrics();
        info!(
            cache_hits = metrics.cache_hits,
            cache_misses = metrics.cache_misses,
            fetches = metrics.fetches,
            fetch_failures = metrics.fetch_failures,
            stale_served = metrics.stale_served,
            "Node stopped"
        );
        Ok(metrics)
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The price service, for the API layer.
    pub fn service(&self) -> &PriceService {
        &self.service
    }

    pub fn prewarmer(&self) -> &Prewarmer {
        &self.prewarmer
    }
}
