//! Provider adapters (FAA, CheckWX, VATSIM, yr.no, Netatmo, energy, traffic)
//!
//! Each adapter translates one upstream wire format into the normalized
//! per-tick records and fails independently: a whole-request error is
//! returned to the caller, never raised past the adapter boundary, and a
//! single unparseable value only blanks that field.

mod checkwx;
mod energy;
mod faa;
mod netatmo;
mod traffic;
pub mod units;
mod vatsim;
mod yrno;

pub use checkwx::CheckWxClient;
pub use energy::EnergyClient;
pub use faa::FaaClient;
pub use netatmo::{FileTokenStore, NetatmoClient, TokenPair, TokenStore};
pub use traffic::{CensusSource, TrafficClient};
#[cfg(test)]
pub use traffic::MockCensusSource;
pub use vatsim::VatsimMetarClient;
pub use yrno::YrNoClient;

use crate::error::ProviderError;
use crate::types::{ProviderId, StationObservation};
use async_trait::async_trait;
use std::time::Duration;

/// Trait for METAR source adapters
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetarProvider: Send + Sync {
    /// Identity used in logs and for reconciliation priority
    fn id(&self) -> ProviderId;

    /// Fetch observations for the given stations. Implementations batch
    /// where the upstream supports it and issue one request per station
    /// otherwise. Returns at most one observation per station.
    async fn fetch(&self, stations: &[String])
        -> Result<Vec<StationObservation>, ProviderError>;
}

/// Shared HTTP client constructor: every outbound call carries an explicit
/// deadline so a hung upstream cannot stall a cycle indefinitely.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client")
}

/// Construct the METAR adapters in the configured priority order, so the
/// slow cycle's sequential fan-out calls the highest-priority provider
/// first.
pub fn metar_providers(
    config: &crate::config::AppConfig,
    timeout: Duration,
) -> anyhow::Result<Vec<Box<dyn MetarProvider>>> {
    let providers = config
        .provider_priority()?
        .into_iter()
        .map(|id| -> Box<dyn MetarProvider> {
            match id {
                ProviderId::Faa => Box::new(FaaClient::new(timeout)),
                ProviderId::CheckWx => {
                    Box::new(CheckWxClient::new(config.checkwx.api_key.clone(), timeout))
                }
                ProviderId::Vatsim => Box::new(VatsimMetarClient::new(
                    config.vatsim.metar_url.clone(),
                    timeout,
                )),
            }
        })
        .collect();
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_metar_providers_follow_configured_priority() {
        let mut config = AppConfig::sample();
        config.stations.provider_priority =
            vec!["VATSIM".into(), "FAA".into(), "CheckWX".into()];

        let providers = metar_providers(&config, Duration::from_secs(1)).unwrap();
        let ids: Vec<ProviderId> = providers.iter().map(|p| p.id()).collect();
        assert_eq!(
            ids,
            vec![ProviderId::Vatsim, ProviderId::Faa, ProviderId::CheckWx]
        );
    }

    #[test]
    fn test_metar_providers_reject_unknown_name() {
        let mut config = AppConfig::sample();
        config.stations.provider_priority = vec!["NOAA".into()];
        assert!(metar_providers(&config, Duration::from_secs(1)).is_err());
    }
}
