use crate::{
    error::AnalysisError,
    reader::{Sample, TimeSeries},
    stats::{quantile, Summary},
};
use plotters::{coord::Shift, drawing::DrawingAreaErrorKind, prelude::*};
use std::path::Path;
use tracing::debug;

/// 10x6 inches at 80 dpi
pub const CHART_SIZE: (u32, u32) = (800, 480);
pub const HISTOGRAM_BINS: usize = 80;
/// samples above `mean + LATENCY_CEILING * stddev` are left out of the histogram
pub const LATENCY_CEILING: f64 = 1.5;
/// series with at least this many samples are drawn with smaller points
pub const DENSE_SERIES: usize = 1000;

const FOOTER_HEIGHT: u32 = 24;
const COLORBAR_WIDTH: u32 = 90;
const COLORBAR_STEPS: usize = 64;

const LATENCY_LINE: RGBColor = RGBColor(255, 165, 0);
const SCATTER_LINE: RGBColor = RGBColor(0, 0, 139);

/// Text placed on a chart
#[derive(Debug, Clone, Copy)]
pub struct ChartLabels<'a> {
    /// filesystem the benchmark ran on
    pub group: &'a str,
    /// short metric name, latency metrics end in `lat`
    pub metric: &'a str,
    pub unit: &'a str,
    pub title: &'a str,
}

/// Render `series` into a PNG at `path`
///
/// Latency metrics become a 2D density histogram of the samples below the
/// display ceiling, every other metric a scatter plot clipped to the 99th
/// percentile. The drawing area lives only for the duration of this call.
pub fn render(
    series: &TimeSeries,
    labels: &ChartLabels<'_>,
    path: &Path,
) -> Result<(), AnalysisError> {
    if series.is_empty() {
        return Err(AnalysisError::EmptySeries(format!(
            "{} {}",
            labels.group, labels.title
        )));
    }

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();

    if labels.metric.ends_with("lat") {
        draw_latency(&root, series, labels)
    } else {
        draw_scatter(&root, series, labels)
    }
    .and_then(|()| root.present())
    .map_err(|error| AnalysisError::Render {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;

    debug!(path = ?path, samples = series.len(), "Saved chart");

    Ok(())
}

/// point radius in pixels, dense series get smaller points to stay legible
pub fn point_size(samples: usize) -> u32 {
    if samples < DENSE_SERIES {
        2
    } else {
        1
    }
}

/// (seconds, value) pairs below the latency display ceiling
///
/// Falls back to the whole series when nothing is below the ceiling, which
/// only happens for a constant series.
pub fn latency_points(series: &TimeSeries, summary: &Summary) -> Vec<(f64, f64)> {
    let ceiling = summary.mean + LATENCY_CEILING * summary.std;
    let to_point = |sample: &Sample| (sample.time as f64 / 1000.0, sample.value);

    let points = series
        .samples
        .iter()
        .filter(|sample| sample.value < ceiling)
        .map(to_point)
        .collect::<Vec<_>>();

    if points.is_empty() {
        series.samples.iter().map(to_point).collect()
    } else {
        points
    }
}

/// upper bound of the scatter plot's value axis
pub fn scatter_ceiling(values: &[f64]) -> f64 {
    match quantile(values, 0.99) {
        Some(ceiling) if ceiling > 0.0 && ceiling.is_finite() => ceiling,
        _ => 1.0,
    }
}

/// Bin counts of a 2D histogram over the bounding box of its points
#[derive(Debug, Clone)]
pub struct Histogram2d {
    pub x: (f64, f64),
    pub y: (f64, f64),
    pub bins: usize,
    /// row major, `counts[y_bin * bins + x_bin]`
    pub counts: Vec<u32>,
}

impl Histogram2d {
    pub fn new(points: &[(f64, f64)], bins: usize) -> Self {
        let x = padded_range(points.iter().map(|point| point.0));
        let y = padded_range(points.iter().map(|point| point.1));
        let mut counts = vec![0; bins * bins];

        for &(px, py) in points {
            counts[bin_index(py, y, bins) * bins + bin_index(px, x, bins)] += 1;
        }

        Self { x, y, bins, counts }
    }

    pub fn max_count(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// corners and count of every bin
    pub fn cells(&self) -> impl Iterator<Item = ([(f64, f64); 2], u32)> + '_ {
        let width = (self.x.1 - self.x.0) / self.bins as f64;
        let height = (self.y.1 - self.y.0) / self.bins as f64;

        self.counts.iter().enumerate().map(move |(index, &count)| {
            let (row, column) = (index / self.bins, index % self.bins);
            let x0 = self.x.0 + column as f64 * width;
            let y0 = self.y.0 + row as f64 * height;

            ([(x0, y0), (x0 + width, y0 + height)], count)
        })
    }
}

fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
        (min.min(value), max.max(value))
    });

    if max > min {
        (min, max)
    } else {
        (min - 0.5, max + 0.5)
    }
}

fn bin_index(value: f64, (low, high): (f64, f64), bins: usize) -> usize {
    let index = ((value - low) / (high - low) * bins as f64).floor();

    (index.max(0.0) as usize).min(bins - 1)
}

/// colour of a histogram bin, empty bins get the darkest shade
fn density_color(count: u32, max_count: u32) -> RGBColor {
    ViridisRGB.get_color_normalized(f64::from(count), 0.0, f64::from(max_count))
}

fn annotation(labels: &ChartLabels<'_>, summary: &Summary) -> String {
    format!(
        "{} mean: {:.3} {unit}, stddev: {:.3} {unit}",
        labels.group,
        summary.mean,
        summary.std,
        unit = labels.unit
    )
}

fn draw_footer<DB: DrawingBackend>(
    footer: &DrawingArea<DB, Shift>,
    text: String,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    footer.draw(&Text::new(text, (10, 4), ("sans-serif", 14).into_font()))
}

fn draw_latency<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    series: &TimeSeries,
    labels: &ChartLabels<'_>,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let summary = Summary::of(&series.values());
    let points = latency_points(series, &summary);
    let histogram = Histogram2d::new(&points, HISTOGRAM_BINS);
    let max_count = histogram.max_count().max(1);

    // reference lines widen the value axis like an autoscaled plot would
    let (x0, x1) = histogram.x;
    let y0 = histogram.y.0.min(summary.mean);
    let y1 = histogram.y.1.max(summary.mean + summary.std);

    let (width, height) = root.dim_in_pixel();
    root.fill(&WHITE)?;
    let (upper, footer) = root.split_vertically(height - FOOTER_HEIGHT);
    let (plot_area, colorbar_area) = upper.split_horizontally(width - COLORBAR_WIDTH);

    let mut chart = ChartBuilder::on(&plot_area)
        .caption(
            format!("{} {}", labels.group, labels.title),
            ("sans-serif", 20).into_font(),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(x0..x1, y0..y1)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("time (s)")
        .y_desc(labels.unit)
        .draw()?;

    chart.draw_series(histogram.cells().map(|(corners, count)| {
        Rectangle::new(
            corners,
            density_color(count, max_count).filled(),
        )
    }))?;

    chart.draw_series(LineSeries::new(
        vec![(x0, summary.mean), (x1, summary.mean)],
        LATENCY_LINE.stroke_width(5),
    ))?;
    chart.draw_series(LineSeries::new(
        vec![(x0, summary.mean + summary.std), (x1, summary.mean + summary.std)],
        LATENCY_LINE.stroke_width(2),
    ))?;

    let mut colorbar = ChartBuilder::on(&colorbar_area)
        .margin_top(40)
        .margin_bottom(50)
        .margin_right(15)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..1.0, 0.0..f64::from(max_count))?;

    colorbar
        .configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_labels(5)
        .draw()?;

    let step = f64::from(max_count) / COLORBAR_STEPS as f64;
    colorbar.draw_series((0..COLORBAR_STEPS).map(|index| {
        let low = index as f64 * step;

        Rectangle::new(
            [(0.0, low), (1.0, low + step)],
            ViridisRGB
                .get_color(index as f64 / (COLORBAR_STEPS - 1) as f64)
                .filled(),
        )
    }))?;

    draw_footer(&footer, annotation(labels, &summary))
}

fn draw_scatter<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    series: &TimeSeries,
    labels: &ChartLabels<'_>,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let values = series.values();
    let summary = Summary::of(&values);
    let ceiling = scatter_ceiling(&values);
    let (start, end) = match series.time_range() {
        Some((start, end)) if end > start => (start as f64, end as f64),
        Some((start, _)) => (start as f64, start as f64 + 1.0),
        None => (0.0, 1.0),
    };

    let (_, height) = root.dim_in_pixel();
    root.fill(&WHITE)?;
    let (upper, footer) = root.split_vertically(height - FOOTER_HEIGHT);

    let mut chart = ChartBuilder::on(&upper)
        .caption(labels.title, ("sans-serif", 20).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(start..end, 0.0..ceiling)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("time (ms)")
        .y_desc(labels.unit)
        .draw()?;

    let radius = point_size(series.len());
    // spikes above the 99th percentile stay off-screen
    chart.draw_series(
        series
            .samples
            .iter()
            .filter(|sample| (0.0..=ceiling).contains(&sample.value))
            .map(|sample| Circle::new((sample.time as f64, sample.value), radius, BLUE.filled())),
    )?;

    for level in [
        summary.mean,
        summary.mean + summary.std,
        summary.mean - summary.std,
    ] {
        chart.draw_series(LineSeries::new(
            vec![(start, level), (end, level)],
            SCATTER_LINE.stroke_width(3),
        ))?;
    }

    draw_footer(&footer, annotation(labels, &summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Direction;
    use std::fs;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn series(values: &[f64]) -> TimeSeries {
        TimeSeries::new(
            "lat",
            values
                .iter()
                .enumerate()
                .map(|(index, &value)| Sample {
                    time: index as u64 * 250,
                    value,
                    direction: Direction::Read,
                    block_size: 4096,
                })
                .collect(),
        )
    }

    fn labels<'a>(metric: &'a str, unit: &'a str) -> ChartLabels<'a> {
        ChartLabels {
            group: "ext4",
            metric,
            unit,
            title: "Seqread test",
        }
    }

    #[test]
    fn dense_series_get_small_points() {
        assert!(point_size(999) > point_size(1000));
        assert_eq!(point_size(1000), point_size(50_000));
    }

    #[test]
    fn latency_outliers_are_dropped() {
        let mut values = vec![100.0; 40];
        values.extend([90.0, 110.0, 10_000.0]);
        let series = series(&values);
        let summary = Summary::of(&series.values());
        let points = latency_points(&series, &summary);

        assert_eq!(points.len(), values.len() - 1);
        assert!(points.iter().all(|(_, value)| *value < 10_000.0));
        // time axis is in seconds
        assert_eq!(points[4].0, 1.0);
    }

    #[test]
    fn constant_latency_keeps_all_points() {
        let series = series(&[42.0; 10]);
        let summary = Summary::of(&series.values());

        assert_eq!(latency_points(&series, &summary).len(), 10);
    }

    #[test]
    fn histogram_counts_every_point() {
        let points = (0..500)
            .map(|index| (f64::from(index) / 10.0, f64::from(index % 37)))
            .collect::<Vec<_>>();
        let histogram = Histogram2d::new(&points, HISTOGRAM_BINS);

        assert_eq!(histogram.counts.len(), HISTOGRAM_BINS * HISTOGRAM_BINS);
        assert_eq!(histogram.counts.iter().sum::<u32>(), 500);
        assert_eq!(histogram.x, (0.0, 49.9));
        assert_eq!(histogram.cells().count(), HISTOGRAM_BINS * HISTOGRAM_BINS);
    }

    #[test]
    fn density_colors_span_viridis() {
        assert_eq!(density_color(0, 40), RGBColor(68, 1, 84));
        assert_eq!(density_color(40, 40), RGBColor(254, 232, 37));
        assert_eq!(density_color(20, 40), ViridisRGB.get_color(0.5));
    }

    #[test]
    fn scatter_ceiling_is_p99() {
        let values = (1..=100).map(f64::from).collect::<Vec<_>>();

        assert!((scatter_ceiling(&values) - 99.01).abs() < 1e-9);
        assert_eq!(scatter_ceiling(&[0.0, 0.0]), 1.0);
    }

    #[test]
    fn empty_series_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        let result = render(&series(&[]), &labels("bw", "KB/s"), &path);

        assert!(matches!(result, Err(AnalysisError::EmptySeries(_))));
        assert!(!path.exists());
    }

    #[test]
    fn renders_png_files() {
        let dir = tempfile::tempdir().unwrap();
        let values = (0..1500)
            .map(|index| f64::from(index % 97) * 3.5 + 200.0)
            .collect::<Vec<_>>();

        for (metric, unit) in [("bw", "KB/s"), ("lat", "usec")] {
            let path = dir.path().join(format!("{metric}.png"));
            render(&series(&values), &labels(metric, unit), &path).unwrap();

            let bytes = fs::read(&path).unwrap();
            assert_eq!(bytes[..8], PNG_MAGIC);
        }
    }
}
