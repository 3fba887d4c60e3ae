//! Market-data client resolution
//!
//! Tries each configured source in order and keeps the first client that
//! can be built.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use kline_core::{KlineError, KlineResult, MarketDataClient};
use kline_tradingview::TradingViewClient;

use crate::replay::ReplayClient;

/// Where a client can come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientSource {
    /// Live TradingView servers
    Remote,
    /// Recorded fixtures in a local directory
    Fixtures(PathBuf),
}

impl fmt::Display for ClientSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientSource::Remote => write!(f, "remote"),
            ClientSource::Fixtures(dir) => write!(f, "fixtures ({})", dir.display()),
        }
    }
}

/// Outcome of client resolution
pub enum ClientModule {
    Loaded {
        source: ClientSource,
        client: Arc<dyn MarketDataClient>,
    },
    /// Every source failed; each attempt with its reason
    Unavailable { attempts: Vec<(ClientSource, String)> },
}

impl fmt::Debug for ClientModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientModule::Loaded { source, client } => f
                .debug_struct("Loaded")
                .field("source", source)
                .field("client", &client.name())
                .finish(),
            ClientModule::Unavailable { attempts } => f
                .debug_struct("Unavailable")
                .field("attempts", attempts)
                .finish(),
        }
    }
}

impl ClientModule {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ClientModule::Loaded { .. })
    }

    /// The loaded client, or a `ModuleUnavailable` error listing every attempt
    pub fn into_client(self) -> KlineResult<Arc<dyn MarketDataClient>> {
        match self {
            ClientModule::Loaded { client, .. } => Ok(client),
            ClientModule::Unavailable { attempts } if attempts.is_empty() => {
                Err(KlineError::module_unavailable("no client sources configured"))
            }
            ClientModule::Unavailable { attempts } => Err(KlineError::module_unavailable(
                attempts
                    .iter()
                    .map(|(source, reason)| format!("{}: {}", source, reason))
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
        }
    }
}

fn build(source: &ClientSource) -> KlineResult<Arc<dyn MarketDataClient>> {
    match source {
        ClientSource::Remote => {
            let client = TradingViewClient::new().map_err(KlineError::from)?;
            Ok(Arc::new(client))
        }
        ClientSource::Fixtures(dir) => Ok(Arc::new(ReplayClient::from_dir(dir)?)),
    }
}

/// Resolve a client from the first source that works
pub fn resolve_client(sources: &[ClientSource]) -> ClientModule {
    let mut attempts = Vec::new();

    for source in sources {
        match build(source) {
            Ok(client) => {
                info!(source = %source, "Loaded {} client from {}", client.name(), source);
                return ClientModule::Loaded {
                    source: source.clone(),
                    client,
                };
            }
            Err(e) => {
                warn!(source = %source, "Client source {} unavailable: {}", source, e);
                attempts.push((source.clone(), e.to_string()));
            }
        }
    }

    ClientModule::Unavailable { attempts }
}
