//! Intermediate snapshot collection

use crate::buffer::PixelBuffer;

/// Image state after a named stage
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub name: String,
    pub image: PixelBuffer,
}

/// Sink the pipeline reports stage outputs to.
///
/// A disabled sink ignores everything, so stages never pay for a copy unless
/// snapshots were asked for.
#[derive(Debug, Default)]
pub struct Diagnostics {
    enabled: bool,
    snapshots: Vec<Snapshot>,
}

impl Diagnostics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            snapshots: Vec::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, name: &str, image: &PixelBuffer) {
        if self.enabled {
            self.snapshots.push(Snapshot {
                name: name.to_string(),
                image: image.clone(),
            });
        }
    }

    /// Snapshots in the order they were recorded
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn names(&self) -> Vec<&str> {
        self.snapshots.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn into_snapshots(self) -> Vec<Snapshot> {
        self.snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_sink_records_nothing() {
        let img = PixelBuffer::filled(2, 2, 1, 0).unwrap();
        let mut diagnostics = Diagnostics::disabled();
        diagnostics.record("01_grayscale", &img);
        assert!(diagnostics.snapshots().is_empty());
    }

    #[test]
    fn test_enabled_sink_keeps_order() {
        let img = PixelBuffer::filled(2, 2, 1, 0).unwrap();
        let mut diagnostics = Diagnostics::new(true);
        diagnostics.record("00_original", &img);
        diagnostics.record("01_grayscale", &img);
        assert_eq!(diagnostics.names(), vec!["00_original", "01_grayscale"]);
        assert_eq!(diagnostics.into_snapshots()[1].image, img);
    }
}
