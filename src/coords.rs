use serde::Serialize;

/// Signed decimal degrees. Both halves are absent when the source text could
/// not be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatLon {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl LatLon {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Parses a BioSample `lat_lon` value such as `"12.34 N 56.78 W"`.
///
/// Decimal commas are accepted. `S` negates the latitude and `W` negates the
/// longitude; anything that is not exactly four tokens with numeric values
/// is unavailable.
pub fn parse_lat_lon(text: &str) -> LatLon {
    let normalized = text.trim().replace(',', ".");
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    let [lat, lat_hemi, lon, lon_hemi] = tokens.as_slice() else {
        return LatLon::unavailable();
    };

    let (Ok(mut latitude), Ok(mut longitude)) = (lat.parse::<f64>(), lon.parse::<f64>()) else {
        return LatLon::unavailable();
    };
    if !latitude.is_finite() || !longitude.is_finite() {
        return LatLon::unavailable();
    }

    if lat_hemi.eq_ignore_ascii_case("S") {
        latitude = -latitude;
    }
    if lon_hemi.eq_ignore_ascii_case("W") {
        longitude = -longitude;
    }

    LatLon {
        latitude: Some(latitude),
        longitude: Some(longitude),
    }
}

/// Ledger representation of a coordinate. Integral values keep one decimal
/// place so existing ledgers stay byte-stable.
pub fn format_coordinate(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}
