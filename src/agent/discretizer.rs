//! Maps a continuous sensor [`Context`] onto the agent's finite state space.
//!
//! Four independent axes are binned against fixed ascending edges:
//!
//! ```text
//! delta (°C)      <2 | <4 | <6 | rest    -> 4 levels
//! UV index        <3 | <6 | <9 | rest    -> 4 levels
//! wind (km/h)     <15 | <30 | rest       -> 3 levels
//! elevation (°)   <20 | <45 | rest       -> 3 levels
//! ```
//!
//! `index = delta_bin * 36 + uv_bin * 9 + wind_bin * 3 + elevation_bin`,
//! giving 144 states. Out-of-range values clamp to the extreme bin.

use serde::{Deserialize, Serialize};

use crate::context::Context;

/// Number of discrete states (4 × 4 × 3 × 3).
pub const NUM_STATES: usize = 144;

/// Upper edges (exclusive) of the delta bins; values at or above the last edge fall in the last bin.
pub const DELTA_EDGES: [f64; 3] = [2.0, 4.0, 6.0];
/// Upper edges (exclusive) of the UV bins.
pub const UV_EDGES: [f64; 3] = [3.0, 6.0, 9.0];
/// Upper edges (exclusive) of the wind bins.
pub const WIND_EDGES: [f64; 2] = [15.0, 30.0];
/// Upper edges (exclusive) of the sun elevation bins.
pub const ELEVATION_EDGES: [f64; 2] = [20.0, 45.0];

/// Index of a discrete state, always in `0..NUM_STATES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateIndex(usize);

impl StateIndex {
    /// Build an index, clamping to the last valid state.
    pub fn new(index: usize) -> Self {
        Self(index.min(NUM_STATES - 1))
    }

    /// Raw index value.
    pub fn get(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for StateIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-axis bins of a discretized context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisBins {
    pub delta: usize,
    pub uv: usize,
    pub wind: usize,
    pub elevation: usize,
}

impl AxisBins {
    /// Flatten into a composite state index.
    pub fn index(&self) -> StateIndex {
        StateIndex::new(self.delta * 36 + self.uv * 9 + self.wind * 3 + self.elevation)
    }
}

/// Stateless context discretizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discretizer;

impl Discretizer {
    /// Discretize a context.
    ///
    /// Unavailable UV, wind or elevation readings fall into the lowest bin.
    pub fn discretize(context: &Context) -> StateIndex {
        Self::bins(
            context.delta(),
            context.uv_index.unwrap_or(0.0),
            context.wind_speed.unwrap_or(0.0),
            context.sun_elevation.unwrap_or(0.0),
        )
        .index()
    }

    /// Bin raw axis values.
    pub fn bins(delta: f64, uv: f64, wind: f64, elevation: f64) -> AxisBins {
        AxisBins {
            delta: bin_value(delta, &DELTA_EDGES),
            uv: bin_value(uv, &UV_EDGES),
            wind: bin_value(wind, &WIND_EDGES),
            elevation: bin_value(elevation, &ELEVATION_EDGES),
        }
    }
}

/// First bin whose edge is strictly greater than `value`; the last bin otherwise.
///
/// NaN maps to bin 0 so the mapping stays total.
pub fn bin_value(value: f64, edges: &[f64]) -> usize {
    if value.is_nan() {
        return 0;
    }
    edges
        .iter()
        .position(|&edge| value < edge)
        .unwrap_or(edges.len())
}
