//! Shared daemon state, generic over the store seam.

use std::sync::Arc;

use serde::Serialize;

use fdk_db::DispatchStore;
use fdk_dispatch::{DispatchService, RoundService};
use fdk_notify::Notifier;
use fdk_schemas::QuotaShares;

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
pub struct AppState<S> {
    pub store: Arc<S>,
    pub dispatch: DispatchService<S>,
    pub rounds: RoundService<S>,
    pub quota_shares: QuotaShares,
    pub build: BuildInfo,
}

impl<S: DispatchStore> AppState<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>, quota_shares: QuotaShares) -> Self {
        Self {
            dispatch: DispatchService::new(Arc::clone(&store), Arc::clone(&notifier)),
            rounds: RoundService::new(Arc::clone(&store), notifier),
            store,
            quota_shares,
            build: BuildInfo {
                service: "fdk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}
