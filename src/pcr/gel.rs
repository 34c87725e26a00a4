//! Agarose gel projection of band data

use serde::{Deserialize, Serialize};

use super::simulator::BandData;

/// Size scale (bp) of the exponential mobility model
const MOBILITY_GAMMA: f64 = 3400.0;

/// Position and strength of one band in a lane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GelBand {
    pub mobility: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GelLane {
    pub name: String,
    pub is_marker: bool,
    pub bands: Vec<GelBand>,
}

/// Migration distance for a fragment of `size` bp
pub fn mobility(size: usize) -> f64 {
    -240.0 + 810.0 * (-(size as f64) / MOBILITY_GAMMA).exp()
}

pub fn band_height(quantity: f64, size: usize) -> f64 {
    500.0 * (quantity.max(0.0) * size as f64).sqrt()
}

pub fn to_gel_band(band: &BandData) -> GelBand {
    GelBand {
        mobility: mobility(band.size),
        height: band_height(band.quantity, band.size),
    }
}

/// Evenly spaced ladder; every band carries the same mass
pub fn marker_band_data(ladder_spacing: usize, num_bands: usize) -> Vec<BandData> {
    (1..=num_bands)
        .map(|i| {
            let size = i * ladder_spacing;
            BandData {
                size,
                quantity: 5e-4 / size.max(1) as f64,
            }
        })
        .collect()
}

/// Marker lane "M" followed by one lane per sample
pub fn gel_lanes(samples: &[(String, Vec<BandData>)]) -> Vec<GelLane> {
    let marker = GelLane {
        name: "M".to_string(),
        is_marker: true,
        bands: marker_band_data(100, 30).iter().map(to_gel_band).collect(),
    };
    std::iter::once(marker)
        .chain(samples.iter().map(|(name, bands)| GelLane {
            name: name.clone(),
            is_marker: false,
            bands: bands.iter().map(to_gel_band).collect(),
        }))
        .collect()
}
