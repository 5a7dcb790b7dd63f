use choicerig_core::{Result, TaskError};
use serde::{Deserialize, Serialize};

/// Longest valve opening accepted for a 1.5 µl reward, in seconds.
pub const MAX_OPEN_TIME_S: f64 = 1.0;
const REFERENCE_VOLUME_UL: f64 = 1.5;

/// Reward valve: turns a volume into an opening duration.
pub trait Valve {
    /// Seconds the valve must stay open to deliver `volume_ul`.
    fn open_time(&self, volume_ul: f64) -> Result<f64>;
}

/// Calibration table of `(open_time_ms, volume_ul)` points, interpolated
/// piecewise-linearly and extrapolated from the outer segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedValve {
    points: Vec<(f64, f64)>,
}

impl CalibratedValve {
    pub fn new(mut points: Vec<(f64, f64)>) -> Result<Self> {
        if points.len() < 2 {
            return Err(TaskError::config("valve calibration needs at least two points"));
        }
        if points
            .iter()
            .any(|(ms, ul)| !ms.is_finite() || !ul.is_finite() || *ms < 0.0 || *ul < 0.0)
        {
            return Err(TaskError::config("valve calibration points must be finite and >= 0"));
        }
        points.sort_by(|a, b| a.1.total_cmp(&b.1));
        if points.windows(2).any(|w| w[1].1 <= w[0].1 || w[1].0 < w[0].0) {
            return Err(TaskError::config(
                "valve calibration must increase in volume with open time",
            ));
        }
        let valve = Self { points };
        valve.check_max_open_time()?;
        Ok(valve)
    }

    fn check_max_open_time(&self) -> Result<()> {
        let t = self.open_time(REFERENCE_VOLUME_UL)?;
        if t >= MAX_OPEN_TIME_S {
            return Err(TaskError::config(format!(
                "valve open time for {REFERENCE_VOLUME_UL} µl is {t:.3} s, recalibrate the rig"
            )));
        }
        Ok(())
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}

impl Valve for CalibratedValve {
    fn open_time(&self, volume_ul: f64) -> Result<f64> {
        if !volume_ul.is_finite() || volume_ul < 0.0 {
            return Err(TaskError::invalid(format!("reward volume {volume_ul} µl")));
        }
        if volume_ul == 0.0 {
            return Ok(0.0);
        }
        let n = self.points.len();
        let i = self
            .points
            .iter()
            .position(|(_, ul)| *ul >= volume_ul)
            .unwrap_or(n - 1)
            .clamp(1, n - 1);
        let (ms0, ul0) = self.points[i - 1];
        let (ms1, ul1) = self.points[i];
        let ms = ms0 + (volume_ul - ul0) * (ms1 - ms0) / (ul1 - ul0);
        Ok(ms.max(0.0) / 1e3)
    }
}

/// Hand-set calibration: `calibration_value` seconds deliver 3 µl.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualValve {
    pub calibration_value: f64,
}

impl ManualValve {
    pub fn new(calibration_value: f64) -> Result<Self> {
        if !(calibration_value.is_finite() && calibration_value > 0.0) {
            return Err(TaskError::config("CALIBRATION_VALUE must be positive"));
        }
        let valve = Self { calibration_value };
        if valve.open_time(REFERENCE_VOLUME_UL)? >= MAX_OPEN_TIME_S {
            return Err(TaskError::config("manual valve calibration opens for too long"));
        }
        Ok(valve)
    }
}

impl Valve for ManualValve {
    fn open_time(&self, volume_ul: f64) -> Result<f64> {
        if !volume_ul.is_finite() || volume_ul < 0.0 {
            return Err(TaskError::invalid(format!("reward volume {volume_ul} µl")));
        }
        Ok(self.calibration_value / 3.0 * volume_ul)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valve() -> CalibratedValve {
        CalibratedValve::new(vec![(100.0, 4.0), (20.0, 0.5), (50.0, 1.7)]).unwrap()
    }

    #[test]
    fn interpolates_between_points() {
        let v = valve();
        assert!((v.open_time(1.7).unwrap() - 0.05).abs() < 1e-12);
        let mid = v.open_time(1.1).unwrap();
        assert!((mid - 0.035).abs() < 1e-12, "{mid}");
        assert_eq!(v.open_time(0.0).unwrap(), 0.0);
        assert!(v.open_time(5.0).unwrap() > 0.1);
        assert!(v.open_time(-1.0).is_err());
    }

    #[test]
    fn rejects_bad_calibrations() {
        assert!(CalibratedValve::new(vec![(10.0, 1.0)]).is_err());
        assert!(CalibratedValve::new(vec![(10.0, 1.0), (5.0, 2.0)]).is_err());
        assert!(CalibratedValve::new(vec![(2000.0, 1.0), (3000.0, 2.0)]).is_err());
    }

    #[test]
    fn manual_valve_scales_linearly() {
        let v = ManualValve::new(0.15).unwrap();
        assert!((v.open_time(3.0).unwrap() - 0.15).abs() < 1e-12);
        assert!((v.open_time(1.5).unwrap() - 0.075).abs() < 1e-12);
        assert!(ManualValve::new(3.0).is_err());
    }
}
