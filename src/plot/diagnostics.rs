//! Residual diagnostics rendered to PNG.
//!
//! Three fixed charts are written for every fit:
//!
//! - residuals vs fitted values, with a dashed zero line
//! - normal Q–Q plot of standardized residuals, with a least-squares line
//! - scale–location: `sqrt(|standardized residual|)` vs fitted values
//!
//! Text (titles, axis descriptions, tick labels) is drawn when the crate is
//! built with the `labels` feature, using an embedded DejaVu Sans face. Without
//! it the charts keep the frame, light grid lines and the data.

use std::fs;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use tracing::debug;

use crate::domain::FittedModel;
use crate::error::AppError;
use crate::math::normal_probplot;

pub const RESIDUALS_VS_FITTED: &str = "residuals_vs_fitted.png";
pub const QQ_PLOT: &str = "qq_plot.png";
pub const SCALE_LOCATION: &str = "scale_location.png";

/// Output size in pixels (a 6×4 inch figure at ~133 dpi).
const SIZE: (u32, u32) = (800, 533);
const POINT_RADIUS: i32 = 3;
/// Grid cells per axis when tick labels are unavailable.
const GRID_DIVISIONS: usize = 5;

#[cfg(feature = "labels")]
static CHART_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

#[derive(Debug, Clone, Copy)]
enum Reference {
    /// Dashed horizontal line at y = 0.
    Zero,
    /// Solid line `y = intercept + slope * x`.
    Line { slope: f64, intercept: f64 },
}

struct Chart<'a> {
    title: &'a str,
    x_label: &'a str,
    y_label: &'a str,
    points: Vec<(f64, f64)>,
    reference: Option<Reference>,
}

/// `residual / sqrt(scale)` for every observation.
pub fn standardized_residuals(model: &FittedModel) -> Vec<f64> {
    let sd = model.scale.sqrt();
    model.residuals.iter().map(|r| r / sd).collect()
}

/// Write the three diagnostic charts into `dir` and return their paths.
pub fn render_diagnostics(model: &FittedModel, dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    fs::create_dir_all(dir).map_err(|e| {
        AppError::io(format!("Failed to create diagnostics directory '{}': {e}", dir.display()))
    })?;

    #[cfg(feature = "labels")]
    register_chart_font()?;

    let std_resid = standardized_residuals(model);
    let probplot = normal_probplot(&std_resid);

    let charts = [
        (
            RESIDUALS_VS_FITTED,
            Chart {
                title: "Residuals vs Fitted",
                x_label: "Fitted values",
                y_label: "Residuals",
                points: zip_points(&model.fitted, &model.residuals),
                reference: Some(Reference::Zero),
            },
        ),
        (
            QQ_PLOT,
            Chart {
                title: "Normal Q-Q",
                x_label: "Theoretical quantiles",
                y_label: "Standardized residuals",
                points: zip_points(&probplot.theoretical, &probplot.ordered),
                reference: Some(Reference::Line {
                    slope: probplot.slope,
                    intercept: probplot.intercept,
                }),
            },
        ),
        (
            SCALE_LOCATION,
            Chart {
                title: "Scale-Location",
                x_label: "Fitted values",
                y_label: "sqrt(|Standardized residuals|)",
                points: zip_points(
                    &model.fitted,
                    &std_resid.iter().map(|r| r.abs().sqrt()).collect::<Vec<_>>(),
                ),
                reference: None,
            },
        ),
    ];

    let mut written = Vec::with_capacity(charts.len());
    for (name, chart) in &charts {
        let path = dir.join(name);
        draw_chart(&path, chart)?;
        debug!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

/// Make the embedded face available as `sans-serif` (once per process).
#[cfg(feature = "labels")]
fn register_chart_font() -> Result<(), AppError> {
    use std::sync::OnceLock;

    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let ok = *REGISTERED.get_or_init(|| {
        plotters::style::register_font("sans-serif", FontStyle::Normal, CHART_FONT).is_ok()
    });
    if ok {
        Ok(())
    } else {
        Err(AppError::io("Embedded chart font could not be parsed."))
    }
}

/// Evenly spaced interior grid lines, verticals first.
fn grid_lines(x: (f64, f64), y: (f64, f64)) -> Vec<[(f64, f64); 2]> {
    let step = |lo: f64, hi: f64, k: usize| lo + (hi - lo) * k as f64 / GRID_DIVISIONS as f64;
    let verticals = (1..GRID_DIVISIONS).map(|k| {
        let xk = step(x.0, x.1, k);
        [(xk, y.0), (xk, y.1)]
    });
    let horizontals = (1..GRID_DIVISIONS).map(|k| {
        let yk = step(y.0, y.1, k);
        [(x.0, yk), (x.1, yk)]
    });
    verticals.chain(horizontals).collect()
}

fn zip_points(xs: &[f64], ys: &[f64]) -> Vec<(f64, f64)> {
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| (x, y))
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect()
}

/// Data range padded by 5%; degenerate ranges are widened to ±1.
fn axis_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (-1.0, 1.0);
    }
    let span = hi - lo;
    if span <= 0.0 {
        return (lo - 1.0, hi + 1.0);
    }
    let pad = 0.05 * span;
    (lo - pad, hi + pad)
}

fn draw_chart(path: &Path, chart: &Chart) -> Result<(), AppError> {
    let draw_err = |e: &dyn std::fmt::Display| {
        AppError::io(format!("Failed to draw '{}': {e}", path.display()))
    };

    let (x0, x1) = axis_range(chart.points.iter().map(|p| p.0));
    let reference_ys: Vec<f64> = match chart.reference {
        Some(Reference::Zero) => vec![0.0],
        Some(Reference::Line { slope, intercept }) => {
            vec![intercept + slope * x0, intercept + slope * x1]
        }
        None => Vec::new(),
    };
    let (y0, y1) = axis_range(chart.points.iter().map(|p| p.1).chain(reference_ys));

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| draw_err(&e))?;

    let labels = cfg!(feature = "labels");
    let mut builder = ChartBuilder::on(&root);
    builder.margin(20);
    if labels {
        builder
            .caption(chart.title, ("sans-serif", 24))
            .x_label_area_size(45)
            .y_label_area_size(60);
    }
    let mut ctx = builder
        .build_cartesian_2d(x0..x1, y0..y1)
        .map_err(|e| draw_err(&e))?;

    if labels {
        ctx.configure_mesh()
            .x_desc(chart.x_label)
            .y_desc(chart.y_label)
            .draw()
            .map_err(|e| draw_err(&e))?;
    } else {
        ctx.draw_series(
            grid_lines((x0, x1), (y0, y1))
                .into_iter()
                .map(|line| PathElement::new(line.to_vec(), BLACK.mix(0.1).stroke_width(1))),
        )
        .map_err(|e| draw_err(&e))?;
        ctx.plotting_area()
            .draw(&Rectangle::new([(x0, y0), (x1, y1)], BLACK.stroke_width(1)))
            .map_err(|e| draw_err(&e))?;
    }

    ctx.draw_series(
        chart
            .points
            .iter()
            .map(|&p| Circle::new(p, POINT_RADIUS, BLUE.mix(0.6).filled())),
    )
    .map_err(|e| draw_err(&e))?;

    match chart.reference {
        Some(Reference::Zero) => {
            ctx.draw_series(DashedLineSeries::new(
                vec![(x0, 0.0), (x1, 0.0)],
                10,
                6,
                RED.stroke_width(1),
            ))
            .map_err(|e| draw_err(&e))?;
        }
        Some(Reference::Line { slope, intercept }) => {
            ctx.draw_series(LineSeries::new(
                vec![(x0, intercept + slope * x0), (x1, intercept + slope * x1)],
                RED.stroke_width(2),
            ))
            .map_err(|e| draw_err(&e))?;
        }
        None => {}
    }

    root.present().map_err(|e| draw_err(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::testing::sample_model;

    #[test]
    fn standardized_residuals_divide_by_scale_root() {
        let m = sample_model();
        let s = standardized_residuals(&m);
        // scale = 4
        assert_eq!(s[0], 0.25);
        assert_eq!(s[2], 1.0);
    }

    #[test]
    fn axis_range_pads_and_handles_degenerate_input() {
        assert_eq!(axis_range([0.0, 10.0].into_iter()), (-0.5, 10.5));
        assert_eq!(axis_range([3.0].into_iter()), (2.0, 4.0));
        assert_eq!(axis_range(std::iter::empty()), (-1.0, 1.0));
        assert_eq!(axis_range([f64::NAN].into_iter()), (-1.0, 1.0));
    }

    #[test]
    fn grid_lines_split_each_axis_evenly() {
        let lines = grid_lines((0.0, 10.0), (-1.0, 1.0));
        assert_eq!(lines.len(), 2 * (GRID_DIVISIONS - 1));
        assert_eq!(lines[0], [(2.0, -1.0), (2.0, 1.0)]);
        let first_horizontal = lines[GRID_DIVISIONS - 1];
        assert!((first_horizontal[0].1 + 0.6).abs() < 1e-12);
        assert_eq!(first_horizontal[0].0, 0.0);
        assert_eq!(first_horizontal[1].0, 10.0);
    }

    #[test]
    fn writes_three_named_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("diagnostics");
        let files = render_diagnostics(&sample_model(), &out).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![RESIDUALS_VS_FITTED, QQ_PLOT, SCALE_LOCATION]);
        for f in &files {
            assert!(std::fs::metadata(f).unwrap().len() > 0);
        }
    }

    #[test]
    fn diagnostics_under_a_regular_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("models");
        std::fs::write(&blocker, "not a directory").unwrap();

        let err = render_diagnostics(&sample_model(), &blocker.join("diagnostics")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }

    #[test]
    fn single_observation_still_renders() {
        let mut m = sample_model();
        m.fitted.truncate(1);
        m.residuals.truncate(1);
        m.n_obs = 1;
        let dir = tempfile::tempdir().unwrap();
        let files = render_diagnostics(&m, dir.path()).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| f.exists()));
    }
}
