use serde::Serialize;

/// Running statistics for one collection.
///
/// High-water marks only go up until [`Statistics::reset`]. Averages are a
/// plain running mean over the mutations observed, not time weighted:
/// `avg = (n * avg + value) / (n + 1)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    high_water_count: usize,
    high_water_bytes: u64,
    high_water_largest_element: u64,
    average_count: f64,
    average_bytes: f64,
    average_element_bytes: f64,
    samples: u64,
    element_samples: u64,
}

impl Statistics {
    pub fn high_water_count(&self) -> usize {
        self.high_water_count
    }

    pub fn high_water_bytes(&self) -> u64 {
        self.high_water_bytes
    }

    pub fn high_water_largest_element_bytes(&self) -> u64 {
        self.high_water_largest_element
    }

    pub fn average_count(&self) -> f64 {
        self.average_count
    }

    pub fn average_bytes(&self) -> f64 {
        self.average_bytes
    }

    pub fn average_element_bytes(&self) -> f64 {
        self.average_element_bytes
    }

    /// Number of mutations folded into the count/byte averages.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Records the collection's occupancy after a mutation.
    pub(crate) fn record(&mut self, count: usize, bytes: u64) {
        self.high_water_count = self.high_water_count.max(count);
        self.high_water_bytes = self.high_water_bytes.max(bytes);

        let n = self.samples as f64;
        self.average_count = (n * self.average_count + count as f64) / (n + 1.0);
        self.average_bytes = (n * self.average_bytes + bytes as f64) / (n + 1.0);
        self.samples += 1;
    }

    /// Records the size of an inserted element.
    pub(crate) fn record_element(&mut self, bytes: u64) {
        self.high_water_largest_element = self.high_water_largest_element.max(bytes);

        let n = self.element_samples as f64;
        self.average_element_bytes = (n * self.average_element_bytes + bytes as f64) / (n + 1.0);
        self.element_samples += 1;
    }

    pub(crate) fn reset(&mut self) {
        *self = Statistics::default();
    }
}
