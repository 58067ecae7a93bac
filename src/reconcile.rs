//! METAR reconciliation - picks one authoritative reading per station
//!
//! Up to three independently-failing providers each contribute candidate
//! observations per tick. The reconciler applies a fixed, total priority
//! order (injected at construction, so deployments can reorder providers
//! without a code change) and picks the first provider holding any
//! candidate for a station. Freshness and field completeness are
//! deliberately ignored: a partial high-priority record beats a complete
//! low-priority one. That trade-off keeps the selection deterministic and
//! auditable.

use std::collections::{BTreeMap, HashMap};

use crate::types::{ProviderId, ReconciledObservation, StationObservation};

pub struct Reconciler {
    /// Highest priority first; total and static for the life of the run
    priority: Vec<ProviderId>,
}

impl Reconciler {
    pub fn new(priority: Vec<ProviderId>) -> Self {
        Self { priority }
    }

    /// Select one observation per requested station.
    ///
    /// Stations with no candidate from any provider are omitted from the
    /// result (a logged gap, not an error). A provider returning
    /// duplicate station ids is an undefined upstream condition; the last
    /// record wins.
    pub fn reconcile(
        &self,
        stations: &[String],
        per_provider: &HashMap<ProviderId, Vec<StationObservation>>,
    ) -> BTreeMap<String, ReconciledObservation> {
        let indexed: HashMap<ProviderId, HashMap<&str, &StationObservation>> = per_provider
            .iter()
            .map(|(provider, observations)| (*provider, index_by_station(observations)))
            .collect();

        let mut reconciled = BTreeMap::new();

        for station in stations {
            let chosen = self.priority.iter().find_map(|provider| {
                indexed
                    .get(provider)
                    .and_then(|by_station| by_station.get(station.as_str()))
                    .map(|obs| ReconciledObservation {
                        provider: *provider,
                        observation: (*obs).clone(),
                    })
            });

            match chosen {
                Some(observation) => {
                    tracing::info!(
                        station = %station,
                        provider = %observation.provider,
                        "Using METAR data"
                    );
                    reconciled.insert(station.clone(), observation);
                }
                None => {
                    tracing::warn!(station = %station, "No METAR data found from any provider");
                }
            }
        }

        reconciled
    }
}

fn index_by_station(observations: &[StationObservation]) -> HashMap<&str, &StationObservation> {
    let mut indexed = HashMap::with_capacity(observations.len());
    for obs in observations {
        // last-write-wins on duplicate ids
        indexed.insert(obs.station_id.as_str(), obs);
    }
    indexed
}
