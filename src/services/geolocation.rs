use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::entities::booking::Model as BookingModel;
use crate::metrics::{self, GPS_UNVERIFIED};

/// Mean Earth radius (IUGG) in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

pub const REASON_ADDRESS_UNRESOLVED: &str = "address unresolved";
pub const REASON_INVALID_COORDINATES: &str = "invalid coordinates";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance(self, other)
    }
}

pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Outcome of a proximity check. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VerificationResult {
    pub verified: bool,
    /// Meters between the reported location and the booking address
    pub distance: f64,
    pub max_distance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VerificationResult {
    fn unverified(max_distance: f64, reason: &str) -> Self {
        Self {
            verified: false,
            distance: 0.0,
            max_distance,
            reason: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum GeocodingError {
    #[error("geocoder request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("geocoder returned status {0}")]
    Status(u16),

    #[error("geocoder returned unusable coordinates: {0}")]
    InvalidResponse(String),
}

/// Turns a stored booking address into coordinates.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, address: &Value) -> Result<Option<GeoPoint>, GeocodingError>;
}

/// Coordinates carried on a structured address as `latitude`/`longitude` or `lat`/`lng`.
pub fn embedded_coordinates(address: &Value) -> Option<GeoPoint> {
    let object = address.as_object()?;
    let pick = |keys: &[&str]| {
        keys.iter()
            .filter_map(|key| object.get(*key))
            .find_map(|value| match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
    };

    let point = GeoPoint::new(pick(&["latitude", "lat"])?, pick(&["longitude", "lng", "lon"])?);
    point.is_valid().then_some(point)
}

/// One-line rendering of an address for free-text geocoding.
pub fn format_address(address: &Value) -> Option<String> {
    match address {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(object) => {
            let parts: Vec<&str> = [
                "line1",
                "street",
                "line2",
                "city",
                "state",
                "postal_code",
                "country",
            ]
            .iter()
            .filter_map(|key| object.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Resolves embedded coordinates first, then falls back to a
/// Nominatim-compatible search endpoint when one is configured.
#[derive(Clone)]
pub struct HttpGeocoder {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpGeocoder {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, GeocodingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("booking-checkout-api/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, endpoint })
    }

    async fn search(&self, endpoint: &str, query: &str) -> Result<Option<GeoPoint>, GeocodingError> {
        let response = self
            .client
            .get(endpoint)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeocodingError::Status(response.status().as_u16()));
        }

        let places: Vec<NominatimPlace> = response.json().await?;
        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };

        let latitude = place
            .lat
            .parse::<f64>()
            .map_err(|e| GeocodingError::InvalidResponse(e.to_string()))?;
        let longitude = place
            .lon
            .parse::<f64>()
            .map_err(|e| GeocodingError::InvalidResponse(e.to_string()))?;
        let point = GeoPoint::new(latitude, longitude);
        if !point.is_valid() {
            return Err(GeocodingError::InvalidResponse(format!(
                "{},{}",
                latitude, longitude
            )));
        }
        Ok(Some(point))
    }
}

#[async_trait]
impl AddressResolver for HttpGeocoder {
    async fn resolve(&self, address: &Value) -> Result<Option<GeoPoint>, GeocodingError> {
        if let Some(point) = embedded_coordinates(address) {
            return Ok(Some(point));
        }

        let (Some(endpoint), Some(query)) = (self.endpoint.as_deref(), format_address(address))
        else {
            return Ok(None);
        };

        debug!(query = %query, "geocoding booking address");
        self.search(endpoint, &query).await
    }
}

/// Compares where the professional says they are with where the job is.
///
/// The result never blocks a check-out; mismatches are logged for fraud review.
#[derive(Clone)]
pub struct GpsProximityVerifier {
    resolver: Arc<dyn AddressResolver>,
    max_distance_meters: f64,
}

impl GpsProximityVerifier {
    pub fn new(resolver: Arc<dyn AddressResolver>, max_distance_meters: f64) -> Self {
        Self {
            resolver,
            max_distance_meters,
        }
    }

    pub fn max_distance_meters(&self) -> f64 {
        self.max_distance_meters
    }

    pub async fn verify(
        &self,
        reported: GeoPoint,
        address: &Value,
        max_distance_meters: f64,
    ) -> VerificationResult {
        if !reported.is_valid() {
            return VerificationResult::unverified(max_distance_meters, REASON_INVALID_COORDINATES);
        }

        let target = match self.resolver.resolve(address).await {
            Ok(Some(point)) => point,
            Ok(None) => {
                return VerificationResult::unverified(
                    max_distance_meters,
                    REASON_ADDRESS_UNRESOLVED,
                )
            }
            Err(err) => {
                debug!(error = %err, "address resolution failed");
                return VerificationResult::unverified(
                    max_distance_meters,
                    REASON_ADDRESS_UNRESOLVED,
                );
            }
        };

        let distance = reported.distance_to(&target);
        let verified = distance <= max_distance_meters;
        VerificationResult {
            verified,
            distance,
            max_distance: max_distance_meters,
            reason: (!verified).then(|| {
                format!(
                    "{:.0}m from booking address exceeds {:.0}m",
                    distance, max_distance_meters
                )
            }),
        }
    }

    /// Verifies a check-out location against the booking with the configured threshold
    /// and records the outcome.
    #[instrument(skip(self, booking), fields(booking_id = %booking.id))]
    pub async fn verify_booking(&self, booking: &BookingModel, reported: GeoPoint) -> VerificationResult {
        let result = self
            .verify(reported, &booking.address, self.max_distance_meters)
            .await;

        if result.verified {
            info!(
                booking_id = %booking.id,
                professional_id = %booking.professional_id,
                distance = result.distance,
                "check-out location verified"
            );
        } else {
            metrics::increment_counter(GPS_UNVERIFIED);
            warn!(
                booking_id = %booking.id,
                professional_id = %booking.professional_id,
                severity = "medium",
                distance = result.distance,
                max_distance = result.max_distance,
                reason = result.reason.as_deref().unwrap_or_default(),
                "check-out location mismatch flagged for fraud review"
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedResolver(Option<GeoPoint>);

    #[async_trait]
    impl AddressResolver for FixedResolver {
        async fn resolve(&self, _address: &Value) -> Result<Option<GeoPoint>, GeocodingError> {
            Ok(self.0)
        }
    }

    struct BrokenResolver;

    #[async_trait]
    impl AddressResolver for BrokenResolver {
        async fn resolve(&self, _address: &Value) -> Result<Option<GeoPoint>, GeocodingError> {
            Err(GeocodingError::Status(503))
        }
    }

    #[test]
    fn london_to_paris_is_about_344km() {
        let london = GeoPoint::new(51.5074, -0.1278);
        let paris = GeoPoint::new(48.8566, 2.3522);
        let km = london.distance_to(&paris) / 1000.0;
        assert!((km - 343.5).abs() < 1.5, "got {}", km);
    }

    #[test]
    fn embedded_coordinates_accept_both_key_styles() {
        assert_eq!(
            embedded_coordinates(&json!({"latitude": 40.0, "longitude": -73.0})),
            Some(GeoPoint::new(40.0, -73.0))
        );
        assert_eq!(
            embedded_coordinates(&json!({"lat": "40.5", "lng": "-73.5"})),
            Some(GeoPoint::new(40.5, -73.5))
        );
        assert_eq!(embedded_coordinates(&json!("1 Main St")), None);
        assert_eq!(embedded_coordinates(&json!({"lat": 123.0, "lng": 0.0})), None);
    }

    #[test]
    fn formats_structured_addresses() {
        let address = json!({"street": "1 Main St", "city": "Springfield", "country": "US"});
        assert_eq!(
            format_address(&address).as_deref(),
            Some("1 Main St, Springfield, US")
        );
        assert_eq!(format_address(&json!({})), None);
    }

    #[tokio::test]
    async fn within_threshold_is_verified() {
        let home = GeoPoint::new(40.7128, -74.0060);
        let verifier = GpsProximityVerifier::new(Arc::new(FixedResolver(Some(home))), 150.0);

        let result = verifier
            .verify(GeoPoint::new(40.7129, -74.0061), &json!({}), 150.0)
            .await;
        assert!(result.verified);
        assert!(result.distance < 20.0);
        assert_eq!(result.reason, None);
    }

    #[tokio::test]
    async fn far_location_is_unverified_with_reason() {
        let home = GeoPoint::new(40.7128, -74.0060);
        let verifier = GpsProximityVerifier::new(Arc::new(FixedResolver(Some(home))), 150.0);

        let result = verifier
            .verify(GeoPoint::new(40.8028, -74.0060), &json!({}), 150.0)
            .await;
        assert!(!result.verified);
        assert!(result.distance > 9_000.0);
        assert_eq!(result.max_distance, 150.0);
        assert!(result.reason.is_some());
    }

    #[tokio::test]
    async fn unresolved_address_is_unverified_without_error() {
        for resolver in [
            Arc::new(FixedResolver(None)) as Arc<dyn AddressResolver>,
            Arc::new(BrokenResolver) as Arc<dyn AddressResolver>,
        ] {
            let verifier = GpsProximityVerifier::new(resolver, 150.0);
            let result = verifier
                .verify(GeoPoint::new(1.0, 1.0), &json!("somewhere"), 150.0)
                .await;
            assert!(!result.verified);
            assert_eq!(result.distance, 0.0);
            assert_eq!(result.reason.as_deref(), Some(REASON_ADDRESS_UNRESOLVED));
        }
    }

    #[tokio::test]
    async fn out_of_range_report_is_invalid() {
        let verifier = GpsProximityVerifier::new(Arc::new(FixedResolver(None)), 150.0);
        let result = verifier
            .verify(GeoPoint::new(91.0, 0.0), &json!({}), 150.0)
            .await;
        assert_eq!(result.reason.as_deref(), Some(REASON_INVALID_COORDINATES));
    }
}
