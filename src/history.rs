use std::path::Path;

use plotters::{coord::Shift, prelude::*};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const PLOT_SIZE: (u32, u32) = (1800, 500);

/// Loss and accuracy aggregated over one pass on a dataset split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Mean loss per sample.
    pub loss: f64,
    /// Percentage of correctly classified samples.
    pub accuracy: f64,
    pub correct: usize,
    pub total: usize,
}

impl EpochMetrics {
    pub fn new(loss_sum: f64, correct: usize, total: usize) -> Self {
        if total == 0 {
            return Self::default();
        }

        Self {
            loss: loss_sum / total as f64,
            accuracy: 100.0 * correct as f64 / total as f64,
            correct,
            total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub learning_rate: f64,
    pub train: EpochMetrics,
    pub valid: EpochMetrics,
}

/// Per-epoch metrics of a training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn push(&mut self, record: EpochRecord) {
        self.epochs.push(record);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn train_accuracy(&self) -> Vec<f64> {
        self.series(|record| record.train.accuracy)
    }

    pub fn valid_accuracy(&self) -> Vec<f64> {
        self.series(|record| record.valid.accuracy)
    }

    pub fn train_loss(&self) -> Vec<f64> {
        self.series(|record| record.train.loss)
    }

    pub fn valid_loss(&self) -> Vec<f64> {
        self.series(|record| record.valid.loss)
    }

    fn series(&self, metric: impl Fn(&EpochRecord) -> f64) -> Vec<f64> {
        self.epochs.iter().map(metric).collect()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        Ok(serde_json::from_str(&content)?)
    }
}

fn plot_error<E: std::fmt::Display>(err: E) -> Error {
    Error::Plot(err.to_string())
}

/// Draw the accuracy and loss curves side by side as an SVG file.
pub fn plot_history<P: AsRef<Path>>(history: &TrainingHistory, path: P) -> Result<()> {
    let root = SVGBackend::new(path.as_ref(), PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let (left, right) = root.split_horizontally(PLOT_SIZE.0 / 2);
    draw_panel(
        &left,
        "Accuracy vs. Epoch",
        [
            ("Train Accuracy", history.train_accuracy(), BLUE),
            ("Validation Accuracy", history.valid_accuracy(), RED),
        ],
    )?;
    draw_panel(
        &right,
        "Loss vs. Epoch",
        [
            ("Train Loss", history.train_loss(), BLUE),
            ("Validation Loss", history.valid_loss(), RED),
        ],
    )?;

    root.present().map_err(plot_error)
}

fn draw_panel(
    area: &DrawingArea<SVGBackend<'_>, Shift>,
    caption: &str,
    series: [(&str, Vec<f64>, RGBColor); 2],
) -> Result<()> {
    let num_epochs = series.iter().map(|(_, values, _)| values.len()).max();
    let x_max = num_epochs.unwrap_or(1).max(2) as f64;
    let (y_min, y_max) = value_range(series.iter().flat_map(|(_, values, _)| values.iter()));

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .caption(caption, ("sans-serif", 20))
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(1f64..x_max, y_min..y_max)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc("Epoch")
        .draw()
        .map_err(plot_error)?;

    for (label, values, color) in series {
        let points = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| ((index + 1) as f64, value));

        chart
            .draw_series(LineSeries::new(points, color))
            .map_err(plot_error)?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_error)
}

/// Bounds of the plotted values, padded so flat or empty series still get a visible axis.
fn value_range<'a>(values: impl Iterator<Item = &'a f64>) -> (f64, f64) {
    let (min, max) = values
        .filter(|value| value.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
            (min.min(*value), max.max(*value))
        });

    if min > max {
        return (0.0, 1.0);
    }

    let margin = ((max - min) * 0.05).max(1e-3);
    (min - margin, max + margin)
}
