//! Guest-to-host travel legs.
//!
//! Routing is an external service; this module only defines the seam and
//! the fallback. Lookups run with a bounded concurrency window and a
//! per-lookup timeout. Any failure degrades to a straight-line estimate,
//! so callers always get a leg for every request.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::model::{Coordinates, CoupleId, Course};

/// Cycling distance and duration between two homes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelLeg {
    pub distance_km: f64,
    pub duration_minutes: f64,
    /// Straight-line estimate rather than a routed value
    pub estimated: bool,
}

/// Settings for distance estimation and lookup batching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceConfig {
    #[serde(default = "default_cycling_speed")]
    pub cycling_speed_kmh: f64,
    /// Multiplier from straight-line to street distance
    #[serde(default = "default_detour_factor")]
    pub detour_factor: f64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_lookups: usize,
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
}

fn default_cycling_speed() -> f64 {
    15.0
}
fn default_detour_factor() -> f64 {
    1.3
}
fn default_max_concurrent() -> usize {
    4
}
fn default_lookup_timeout() -> u64 {
    10
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            cycling_speed_kmh: default_cycling_speed(),
            detour_factor: default_detour_factor(),
            max_concurrent_lookups: default_max_concurrent(),
            lookup_timeout_secs: default_lookup_timeout(),
        }
    }
}

/// External routing service.
///
/// Returns `None` when the route cannot be computed.
#[allow(async_fn_in_trait)]
pub trait RouteProvider {
    async fn cycling_leg(&self, from: Coordinates, to: Coordinates) -> Option<TravelLeg>;
}

/// Provider that never answers; every leg falls back to the estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRoutes;

impl RouteProvider for NoRoutes {
    async fn cycling_leg(&self, _from: Coordinates, _to: Coordinates) -> Option<TravelLeg> {
        None
    }
}

/// One guest's trip to its host for one course.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegRequest {
    pub couple_id: CoupleId,
    pub course: Course,
    pub from: Coordinates,
    pub to: Coordinates,
}

/// Estimate a leg from the great-circle distance.
pub fn straight_line_leg(from: Coordinates, to: Coordinates, config: &DistanceConfig) -> TravelLeg {
    let distance_km = from.haversine_km(&to) * config.detour_factor.max(1.0);
    let speed = if config.cycling_speed_kmh > 0.0 {
        config.cycling_speed_kmh
    } else {
        default_cycling_speed()
    };
    TravelLeg {
        distance_km,
        duration_minutes: distance_km / speed * 60.0,
        estimated: true,
    }
}

/// Estimate every leg without calling a provider.
pub fn estimate_legs(
    requests: &[LegRequest],
    config: &DistanceConfig,
) -> HashMap<(CoupleId, Course), TravelLeg> {
    requests
        .iter()
        .map(|r| ((r.couple_id, r.course), straight_line_leg(r.from, r.to, config)))
        .collect()
}

/// Resolve legs through `provider`, at most `max_concurrent_lookups` at a time.
///
/// Timeouts and `None` answers fall back to [`straight_line_leg`].
pub async fn resolve_legs<P: RouteProvider>(
    provider: &P,
    requests: &[LegRequest],
    config: &DistanceConfig,
) -> HashMap<(CoupleId, Course), TravelLeg> {
    let window = config.max_concurrent_lookups.max(1);
    let timeout = Duration::from_secs(config.lookup_timeout_secs.max(1));

    stream::iter(requests.iter().copied())
        .map(|req| async move {
            let leg = match tokio::time::timeout(timeout, provider.cycling_leg(req.from, req.to)).await
            {
                Ok(Some(leg)) => leg,
                Ok(None) => {
                    tracing::warn!(
                        couple_id = req.couple_id,
                        course = %req.course,
                        "route lookup failed, using straight-line estimate"
                    );
                    straight_line_leg(req.from, req.to, config)
                }
                Err(_) => {
                    tracing::warn!(
                        couple_id = req.couple_id,
                        course = %req.course,
                        timeout_secs = timeout.as_secs(),
                        "route lookup timed out, using straight-line estimate"
                    );
                    straight_line_leg(req.from, req.to, config)
                }
            };
            ((req.couple_id, req.course), leg)
        })
        .buffer_unordered(window)
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(couple_id: CoupleId) -> LegRequest {
        LegRequest {
            couple_id,
            course: Course::Main,
            from: Coordinates::new(52.50, 13.40),
            to: Coordinates::new(52.52, 13.40),
        }
    }

    struct FixedRoutes;

    impl RouteProvider for FixedRoutes {
        async fn cycling_leg(&self, _from: Coordinates, _to: Coordinates) -> Option<TravelLeg> {
            Some(TravelLeg {
                distance_km: 3.0,
                duration_minutes: 11.0,
                estimated: false,
            })
        }
    }

    /// Tracks the peak number of lookups in flight.
    struct CountingRoutes {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl RouteProvider for CountingRoutes {
        async fn cycling_leg(&self, _from: Coordinates, _to: Coordinates) -> Option<TravelLeg> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            None
        }
    }

    #[test]
    fn straight_line_applies_detour_and_speed() {
        let config = DistanceConfig::default();
        let r = request(1);
        let leg = straight_line_leg(r.from, r.to, &config);
        let direct = r.from.haversine_km(&r.to);
        assert!((leg.distance_km - direct * 1.3).abs() < 1e-9);
        assert!((leg.duration_minutes - leg.distance_km / 15.0 * 60.0).abs() < 1e-9);
        assert!(leg.estimated);
    }

    #[tokio::test]
    async fn provider_answers_are_used() {
        let legs = resolve_legs(&FixedRoutes, &[request(1), request(2)], &DistanceConfig::default()).await;
        assert_eq!(legs.len(), 2);
        assert!(!legs[&(1, Course::Main)].estimated);
        assert_eq!(legs[&(2, Course::Main)].duration_minutes, 11.0);
    }

    #[tokio::test]
    async fn failed_lookups_degrade_to_estimates() {
        let legs = resolve_legs(&NoRoutes, &[request(7)], &DistanceConfig::default()).await;
        assert!(legs[&(7, Course::Main)].estimated);
    }

    #[tokio::test]
    async fn concurrency_window_is_respected() {
        let provider = CountingRoutes {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let config = DistanceConfig {
            max_concurrent_lookups: 2,
            ..DistanceConfig::default()
        };
        let requests: Vec<_> = (0..8).map(request).collect();
        let legs = resolve_legs(&provider, &requests, &config).await;
        assert_eq!(legs.len(), 8);
        assert!(provider.peak.load(Ordering::SeqCst) <= 2);
    }
}
