// THEORY:
// The report module is the boundary between one run and the outside world. It turns
// the in-memory verdicts and selection into the two JSON artifacts downstream tools
// read: the per-run detection report and the `selection.json` consumed by the
// capture and display components (primary crossing first).

use crate::core_modules::crossing_selector::{Selection, SpreadLevel};
use crate::core_modules::geo::{GeoConfig, MercatorBox};
use crate::core_modules::point_evaluator::{PixelPoint, Verdict};
use crate::error::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Detection summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: String,
    pub threshold: f32,
    pub total_points: usize,
    pub clouds_detected: usize,
    pub results: Vec<Verdict>,
}

impl RunReport {
    pub fn new(timestamp: DateTime<Local>, threshold: f32, verdicts: &[Verdict]) -> Self {
        Self {
            timestamp: timestamp.to_rfc3339(),
            threshold,
            total_points: verdicts.len(),
            clouds_detected: verdicts.iter().filter(|v| v.is_cloud).count(),
            results: verdicts.to_vec(),
        }
    }
}

/// One crossing in `selection.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedEntry {
    pub index: usize,
    pub point: PixelPoint,
    pub probability: f32,
    pub is_primary: bool,
    pub spread: SpreadLevel,
    pub capture_bbox: MercatorBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionReport {
    pub timestamp: String,
    pub primary: Option<usize>,
    pub crossings: Vec<SelectedEntry>,
}

impl SelectionReport {
    pub fn new(timestamp: DateTime<Local>, selection: &Selection, geo: &GeoConfig) -> Self {
        let crossings = selection
            .crossings
            .iter()
            .map(|c| SelectedEntry {
                index: c.verdict.index,
                point: c.verdict.point,
                probability: c.verdict.probability,
                is_primary: c.is_primary,
                spread: c.spread,
                capture_bbox: geo.capture_bbox(c.verdict.point),
            })
            .collect();
        Self {
            timestamp: timestamp.to_rfc3339(),
            primary: selection.primary().map(|c| c.verdict.index),
            crossings,
        }
    }
}

/// Compact timestamp for artifact file names, e.g. `20250114_031500`.
pub fn file_stamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format("%Y%m%d_%H%M%S").to_string()
}

pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::crossing_selector::CrossingSelector;
    use chrono::TimeZone;

    fn verdicts() -> Vec<Verdict> {
        vec![
            Verdict {
                index: 0,
                point: PixelPoint { x: 10, y: 10 },
                probability: 0.1,
                is_cloud: false,
            },
            Verdict {
                index: 1,
                point: PixelPoint { x: 400, y: 200 },
                probability: 0.7,
                is_cloud: true,
            },
            Verdict {
                index: 2,
                point: PixelPoint { x: 600, y: 220 },
                probability: 0.4,
                is_cloud: true,
            },
        ]
    }

    fn stamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 1, 14, 3, 15, 0).unwrap()
    }

    #[test]
    fn run_report_counts_clouds() {
        let report = RunReport::new(stamp(), 0.25, &verdicts());
        assert_eq!(report.total_points, 3);
        assert_eq!(report.clouds_detected, 2);
        assert_eq!(file_stamp(&stamp()), "20250114_031500");
    }

    #[test]
    fn selection_report_names_primary_and_boxes() {
        let selection = CrossingSelector::new(9, 50.0).select(&verdicts());
        let report = SelectionReport::new(stamp(), &selection, &GeoConfig::default());
        assert_eq!(report.primary, Some(1));
        assert_eq!(report.crossings.len(), 2);
        assert!(report.crossings[0].is_primary);
        assert!(!report.crossings[1].is_primary);
        assert!(report.crossings[0].capture_bbox.width() > 0.0);
    }

    #[test]
    fn reports_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = RunReport::new(stamp(), 0.25, &verdicts());
        write_json(&path, &report).unwrap();
        let back: RunReport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, report);
    }
}
