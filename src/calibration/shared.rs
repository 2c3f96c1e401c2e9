use std::sync::{Arc, RwLock};

use super::model::CalibrationFit;

/// The calibration currently in effect, shared between readers.
///
/// The fit is swapped wholesale, so a reader holds either the previous or
/// the new snapshot and never a mix of the two.
#[derive(Debug, Default)]
pub struct CurrentCalibration {
    inner: RwLock<Option<Arc<CalibrationFit>>>,
}

impl CurrentCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current calibration.
    pub fn publish(&self, fit: Arc<CalibrationFit>) {
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(fit);
    }

    pub fn current(&self) -> Option<Arc<CalibrationFit>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Withdraw the current calibration, returning it.
    pub fn retract(&self) -> Option<Arc<CalibrationFit>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner()).take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::model::{fit_polynomial, CalibrationPoint};

    fn fit(slope: f64) -> Arc<CalibrationFit> {
        let points = [
            CalibrationPoint::new(0.0, 400.0),
            CalibrationPoint::new(100.0, 400.0 + 100.0 * slope),
        ];
        Arc::new(fit_polynomial(&points, 1).unwrap())
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let current = CurrentCalibration::new();
        assert!(current.current().is_none());

        current.publish(fit(1.0));
        let held = current.current().unwrap();
        current.publish(fit(2.0));

        // A reader keeps the snapshot it took.
        assert!((held.evaluate(100.0) - 500.0).abs() < 1e-9);
        assert!((current.current().unwrap().evaluate(100.0) - 600.0).abs() < 1e-9);

        assert!(current.retract().is_some());
        assert!(current.current().is_none());
    }

    #[test]
    fn test_concurrent_readers() {
        let current = Arc::new(CurrentCalibration::new());
        current.publish(fit(1.0));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let current = Arc::clone(&current);
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        current.publish(fit(2.0));
                    }
                    let snapshot = current.current().unwrap();
                    let w = snapshot.evaluate(100.0);
                    (w - 500.0).abs() < 1e-9 || (w - 600.0).abs() < 1e-9
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
    }
}
