use crate::{
    catalog::{chart_file_name, METRICS, SCENARIOS},
    error::AnalysisError,
    reader::read_series,
    render::{render, ChartLabels},
};
use itertools::iproduct;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Render every scenario x metric chart of one benchmark
///
/// Charts are written to `graph_dir` and overwrite earlier renders of the same
/// benchmark. The first failing pair aborts the remaining ones.
#[instrument(level = "info", skip(log_dir, graph_dir))]
pub fn process_benchmark(
    run_id: i64,
    filesystem: &str,
    log_dir: &Path,
    graph_dir: &Path,
) -> Result<Vec<PathBuf>, AnalysisError> {
    let charts = iproduct!(SCENARIOS.iter(), METRICS.iter())
        .map(|(scenario, metric)| {
            let series = read_series(log_dir, run_id, filesystem, scenario, metric)?;
            let title = format!("{} {}", scenario.title(), metric.display);
            let path = graph_dir.join(chart_file_name(run_id, filesystem, scenario, metric));

            render(
                &series,
                &ChartLabels {
                    group: filesystem,
                    metric: metric.short,
                    unit: metric.unit,
                    title: &title,
                },
                &path,
            )?;

            debug!(scenario = %scenario, metric = %metric, "Rendered chart");

            Ok(path)
        })
        .collect::<Result<Vec<_>, AnalysisError>>()?;

    info!(charts = charts.len(), "Processed benchmark");

    Ok(charts)
}
