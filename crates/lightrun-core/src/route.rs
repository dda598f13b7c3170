//! Driving-directions deep links for the visitor's run.
//!
//! Stops keep the visitor's order: first is the origin, last the destination,
//! everything between becomes a waypoint. No reordering is attempted.

use crate::itinerary::ItineraryEntry;
use crate::place::Feature;

pub const DIRECTIONS_BASE_URL: &str = "https://www.google.com/maps/dir/";

pub trait RouteStop {
    fn lat(&self) -> f64;
    fn lng(&self) -> f64;

    fn coordinate_pair(&self) -> String {
        format!("{},{}", self.lat(), self.lng())
    }
}

impl RouteStop for ItineraryEntry {
    fn lat(&self) -> f64 {
        self.lat
    }
    fn lng(&self) -> f64 {
        self.lng
    }
}

impl RouteStop for Feature {
    fn lat(&self) -> f64 {
        Feature::lat(self)
    }
    fn lng(&self) -> f64 {
        Feature::lng(self)
    }
}

/// `(lat, lng)`
impl RouteStop for (f64, f64) {
    fn lat(&self) -> f64 {
        self.0
    }
    fn lng(&self) -> f64 {
        self.1
    }
}

pub fn build_route_url<S: RouteStop>(stops: &[S]) -> Option<String> {
    build_route_url_with_base(DIRECTIONS_BASE_URL, stops)
}

pub fn build_route_url_with_base<S: RouteStop>(base: &str, stops: &[S]) -> Option<String> {
    let coords: Vec<String> = stops.iter().map(|s| s.coordinate_pair()).collect();

    match coords.as_slice() {
        [] => None,
        [only] => Some(format!("{}?api=1&destination={}", base, only)),
        [origin, middle @ .., destination] => {
            let mut url = format!(
                "{}?api=1&origin={}&destination={}",
                base, origin, destination
            );
            if !middle.is_empty() {
                let waypoints = middle.join("|");
                url.push_str("&waypoints=");
                url.push_str(&urlencoding::encode(&waypoints));
            }
            Some(url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_stops_have_no_waypoints() {
        let url = build_route_url(&[(-27.9, 153.3), (-28.0, 153.4)]).unwrap();
        assert!(url.contains("origin=-27.9,153.3"));
        assert!(url.contains("destination=-28,153.4"));
        assert!(!url.contains("waypoints"));
    }

    #[test]
    fn test_waypoints_are_percent_encoded() {
        let url = build_route_url(&[(1.0, 2.0), (3.5, 4.5), (5.5, 6.5), (7.0, 8.0)]).unwrap();
        assert!(url.ends_with("&waypoints=3.5%2C4.5%7C5.5%2C6.5"));
    }

    #[test]
    fn test_custom_base() {
        let url = build_route_url_with_base("https://maps.example/dir/", &[(1.5, 2.5)]).unwrap();
        assert_eq!(url, "https://maps.example/dir/?api=1&destination=1.5,2.5");
    }
}
