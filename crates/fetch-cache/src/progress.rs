//! Aggregation of per-download progress into one percentage

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::{ProgressCallback, ProgressUpdate};

/// Combines the progress of several concurrent downloads, keyed by tag.
///
/// Every tracked download weighs the same, whatever its size.
#[derive(Debug, Default)]
pub struct ProgressAggregator {
    fractions: Mutex<BTreeMap<String, Option<f64>>>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `tag` at 0 %
    pub fn track(&self, tag: impl Into<String>) {
        self.lock().entry(tag.into()).or_insert(Some(0.0));
    }

    /// Record an update; the latest report for a tag wins
    pub fn update(&self, update: &ProgressUpdate) {
        self.lock().insert(update.tag.clone(), update.fraction);
    }

    /// Overall completion in percent, `0.0` when nothing is tracked
    pub fn percent(&self) -> f64 {
        let fractions = self.lock();
        if fractions.is_empty() {
            return 0.0;
        }
        let total: f64 = fractions.values().map(|f| f.unwrap_or(0.0)).sum();
        total * 100.0 / fractions.len() as f64
    }

    /// Whether any tracked download cannot report a fraction
    pub fn is_indeterminate(&self) -> bool {
        self.lock().values().any(Option::is_none)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A progress callback feeding this aggregator
    pub fn callback(self: &Arc<Self>) -> ProgressCallback {
        let aggregator = self.clone();
        Arc::new(move |update: ProgressUpdate| aggregator.update(&update))
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Option<f64>>> {
        self.fractions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(tag: &str, fraction: Option<f64>) -> ProgressUpdate {
        ProgressUpdate {
            fraction,
            status: "Downloading".to_string(),
            tag: tag.to_string(),
        }
    }

    #[test]
    fn test_empty_aggregator() {
        let aggregator = ProgressAggregator::new();
        assert_eq!(aggregator.percent(), 0.0);
        assert!(aggregator.is_empty());
        assert!(!aggregator.is_indeterminate());
    }

    #[test]
    fn test_average_of_tracked_downloads() {
        let aggregator = ProgressAggregator::new();
        aggregator.track("AC_H0_MFI");
        aggregator.track("WI_H0_MFI");
        assert_eq!(aggregator.percent(), 0.0);

        aggregator.update(&update("AC_H0_MFI", Some(0.5)));
        assert_eq!(aggregator.percent(), 25.0);

        aggregator.update(&update("WI_H0_MFI", Some(1.0)));
        assert_eq!(aggregator.percent(), 75.0);
        assert_eq!(aggregator.len(), 2);
    }

    #[test]
    fn test_last_write_wins() {
        let aggregator = ProgressAggregator::new();
        aggregator.update(&update("AC_H0_MFI", Some(0.9)));
        aggregator.update(&update("AC_H0_MFI", Some(0.4)));
        assert!((aggregator.percent() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_track_does_not_reset_progress() {
        let aggregator = ProgressAggregator::new();
        aggregator.update(&update("AC_H0_MFI", Some(0.6)));
        aggregator.track("AC_H0_MFI");
        assert!((aggregator.percent() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_fraction_is_indeterminate() {
        let aggregator = ProgressAggregator::new();
        aggregator.track("AC_H0_MFI");
        aggregator.update(&update("WI_H0_MFI", None));
        assert!(aggregator.is_indeterminate());
        assert_eq!(aggregator.percent(), 0.0);

        aggregator.update(&update("WI_H0_MFI", Some(1.0)));
        assert!(!aggregator.is_indeterminate());
        assert_eq!(aggregator.percent(), 50.0);
    }

    #[test]
    fn test_callback_feeds_aggregator_from_threads() {
        let aggregator = Arc::new(ProgressAggregator::new());
        let callback = aggregator.callback();

        let handles: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|tag| {
                let callback = callback.clone();
                std::thread::spawn(move || {
                    for step in 1..=10 {
                        callback(update(tag, Some(step as f64 / 10.0)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(aggregator.len(), 4);
        assert!((aggregator.percent() - 100.0).abs() < 1e-9);
    }
}
