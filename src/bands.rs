//! Frequency band schemes and their resolution into fit-ready interval lists.
//!
//! A [`BandScheme`] describes *where* peaks are allowed to be: a named
//! preset, a generated grid, or a user-supplied list. Resolution turns the
//! scheme into an ordered [`Band`] list once, at model construction time.
use std::f64::consts::E;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::{linspace, logspace};
use crate::error::SpecParamError;

/// The largest number of generated bands a scheme may resolve to, keeping
/// the joint peak optimization well-posed.
pub const MAX_GENERATED_BANDS: usize = 62;

/// A frequency interval inside which exactly one peak is fit.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    /// Whether `freq` falls inside this band, half-open on the low edge
    pub fn contains(&self, freq: f64) -> bool {
        freq > self.low && freq <= self.high
    }

    /// Map both edges into natural-log frequency space
    pub fn to_natural_log(&self) -> Band {
        Band::new(self.low.ln(), self.high.ln())
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}, {:.3})", self.low, self.high)
    }
}

impl From<(f64, f64)> for Band {
    fn from(pair: (f64, f64)) -> Self {
        Self::new(pair.0, pair.1)
    }
}

/// How the band list is produced.
///
/// Named presets carry fixed canonical intervals; the generated variants
/// subdivide the configured frequency range at resolution time.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BandScheme {
    /// The canonical EEG bands from slow oscillations through high gamma
    #[default]
    Standard,
    /// [`BandScheme::Standard`] without the 150-250 Hz band
    StandardNoHigh,
    /// Buzsaki & Draguhn's logarithmically organized oscillation classes
    Buzsaki,
    /// Contiguous bands evenly spaced on a natural-log frequency axis
    Log,
    /// Contiguous bands evenly spaced on a linear frequency axis
    Linear,
    /// Contiguous bands evenly spaced on a base-10 log frequency axis
    Log10,
    /// An explicit user-supplied interval list
    Custom(Vec<Band>),
}

impl BandScheme {
    /// Resolve this scheme into an ordered interval list.
    ///
    /// `count` bounds how many bands the generated schemes produce (capped
    /// at [`MAX_GENERATED_BANDS`]), spanning `[l_freq, h_freq]`. When
    /// `n_division > 1`, every resolved band is replaced by that many
    /// log-spaced sub-bands.
    pub fn resolve(&self, count: usize, l_freq: f64, h_freq: f64, n_division: usize) -> Vec<Band> {
        let bands = match self {
            BandScheme::Standard => preset(&[
                (0.3, 1.5),
                (1.5, 4.0),
                (4.0, 8.0),
                (8.0, 12.5),
                (12.5, 30.0),
                (30.0, 70.0),
                (70.0, 150.0),
                (150.0, 250.0),
            ]),
            BandScheme::StandardNoHigh => preset(&[
                (0.3, 1.5),
                (1.5, 4.0),
                (4.0, 8.0),
                (8.0, 12.5),
                (12.5, 30.0),
                (30.0, 70.0),
                (70.0, 150.0),
            ]),
            BandScheme::Buzsaki => preset(&[
                (1.0 / 5.0, 1.0 / 2.0),
                (1.0 / 2.0, 1.0 / 0.7),
                (1.5, 4.0),
                (4.0, 10.0),
                (10.0, 30.0),
                (30.0, 80.0),
                (80.0, 200.0),
                (200.0, 600.0),
            ]),
            BandScheme::Log => {
                edges_to_bands(&logspace(l_freq, h_freq, capped(count) + 1, E))
            }
            BandScheme::Linear => edges_to_bands(&linspace(l_freq, h_freq, capped(count) + 1)),
            BandScheme::Log10 => {
                edges_to_bands(&logspace(l_freq, h_freq, capped(count) + 1, 10.0))
            }
            BandScheme::Custom(bands) => bands.clone(),
        };

        if n_division > 1 {
            subdivide(&bands, n_division)
        } else {
            bands
        }
    }

    /// Resolve, then drop every band lying entirely outside the
    /// `[l_freq, h_freq)` cutoffs.
    pub fn retained_bands(
        &self,
        count: usize,
        l_freq: f64,
        h_freq: f64,
        n_division: usize,
    ) -> Vec<Band> {
        self.resolve(count, l_freq, h_freq, n_division)
            .into_iter()
            .filter(|band| band.low < h_freq && band.high > l_freq)
            .collect()
    }
}

impl FromStr for BandScheme {
    type Err = SpecParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "standard_nohigh" => Ok(Self::StandardNoHigh),
            "buzsaki" => Ok(Self::Buzsaki),
            "log" => Ok(Self::Log),
            "linear" => Ok(Self::Linear),
            "log10" => Ok(Self::Log10),
            _ => Err(SpecParamError::Configuration(format!(
                "band scheme '{s}' is not recognized, expected one of \
                 'standard', 'standard_nohigh', 'buzsaki', 'log', 'linear', 'log10'"
            ))),
        }
    }
}

impl From<Vec<(f64, f64)>> for BandScheme {
    fn from(pairs: Vec<(f64, f64)>) -> Self {
        Self::Custom(pairs.into_iter().map(Band::from).collect())
    }
}

fn capped(count: usize) -> usize {
    count.min(MAX_GENERATED_BANDS).max(1)
}

fn preset(pairs: &[(f64, f64)]) -> Vec<Band> {
    pairs.iter().map(|p| Band::from(*p)).collect()
}

fn edges_to_bands(edges: &[f64]) -> Vec<Band> {
    edges.windows(2).map(|w| Band::new(w[0], w[1])).collect()
}

/// Split each band into `n` log-spaced sub-bands covering the same interval
fn subdivide(bands: &[Band], n: usize) -> Vec<Band> {
    let mut out = Vec::with_capacity(bands.len() * n);
    for band in bands {
        let spacing = (band.high / band.low).ln() / n as f64;
        for division in 0..n {
            out.push(Band::new(
                band.low * (spacing * division as f64).exp(),
                band.low * (spacing * (division + 1) as f64).exp(),
            ));
        }
    }
    out
}
