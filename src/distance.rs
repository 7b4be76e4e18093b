// Distance tracker: four encoder accumulators -> one scalar distance
//
// The reading lags the true displacement because the counters are sampled
// once per tick while the vehicle keeps moving. Course thresholds are
// calibrated against this reading, so it is reported uncorrected.

use tracing::debug;

use crate::hal::{Result, WheelCounts, WheelEncoders};

pub struct DistanceTracker<E> {
    encoders: E,
    counts: WheelCounts,
    distance: f64,
}

impl<E: WheelEncoders> DistanceTracker<E> {
    pub fn new(encoders: E) -> Self {
        Self {
            encoders,
            counts: WheelCounts::default(),
            distance: 0.0,
        }
    }

    /// Zero the hardware accumulators and the cached distance
    pub fn reset(&mut self) -> Result<()> {
        self.counts = WheelCounts::default();
        self.distance = 0.0;
        debug!("distance reset");
        self.encoders.reset_counts()
    }

    /// Distance in pulses since the last reset
    ///
    /// Mean of the four absolute accumulator values, held non-decreasing
    /// until the next reset.
    pub fn read(&mut self) -> Result<f64> {
        self.counts = self.encoders.read_counts()?;
        let sample = mean_magnitude(&self.counts);
        if sample > self.distance {
            self.distance = sample;
        }
        Ok(self.distance)
    }

    /// Last distance returned by `read`, without sampling
    pub fn last(&self) -> f64 {
        self.distance
    }

    /// Raw accumulators from the last sample
    pub fn counts(&self) -> WheelCounts {
        self.counts
    }

    pub fn encoders(&self) -> &E {
        &self.encoders
    }

    pub fn encoders_mut(&mut self) -> &mut E {
        &mut self.encoders
    }
}

fn mean_magnitude(counts: &WheelCounts) -> f64 {
    let sum: f64 = counts
        .as_array()
        .iter()
        .map(|c| c.unsigned_abs() as f64)
        .sum();
    sum / 4.0
}
