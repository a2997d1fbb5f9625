//! ASCII/Unicode plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Both charts put time on a log10 x-axis.
//!
//! Recovery plot elements:
//! - observed intensities: `o`
//! - fitted curve: `-` line
//!
//! ILT plot: one line per regularization strength, drawn with `1`..`9` in sweep
//! order.

use crate::domain::{IltSweep, RelaxationFit};
use crate::math::log_space;
use crate::models::predict;

const CURVE_MARKS: [char; 9] = ['1', '2', '3', '4', '5', '6', '7', '8', '9'];

/// Render observed intensities and the fitted recovery curve.
pub fn render_recovery_plot(fit: &RelaxationFit, width: usize, height: usize) -> String {
    let observed: Vec<(f64, f64)> = fit
        .curve
        .t
        .iter()
        .zip(fit.observed.iter())
        .filter(|(t, _)| **t > 0.0)
        .map(|(&t, &y)| (t.log10(), y))
        .collect();

    let Some((x_min, x_max)) = x_range(&observed) else {
        return "Plot: not enough positive delay times to draw.\n".to_string();
    };
    let samples = log_space(10f64.powf(x_min), 10f64.powf(x_max), width.max(2) * 2)
        .unwrap_or_default()
        .into_iter()
        .map(|t| (t.log10(), predict(fit.model, t, &fit.params)))
        .collect::<Vec<_>>();

    let header = format!(
        "Plot: delay=[{:.3e}, {:.3e}] us (log) | fit {}",
        10f64.powf(x_min),
        10f64.powf(x_max),
        fit.model.display_name()
    );
    render_plot(&header, &observed, &[('-', samples)], (x_min, x_max), width, height)
}

/// Render every ILT distribution in the sweep over the T1 grid.
pub fn render_ilt_plot(sweep: &IltSweep, width: usize, height: usize) -> String {
    let curves: Vec<(char, Vec<(f64, f64)>)> = sweep
        .curves
        .iter()
        .zip(CURVE_MARKS.iter().cycle())
        .map(|(curve, &mark)| {
            let points = curve
                .t1_grid
                .iter()
                .zip(curve.distribution.iter())
                .map(|(&t, &p)| (t.log10(), p))
                .collect();
            (mark, points)
        })
        .collect();

    let all: Vec<(f64, f64)> = curves.iter().flat_map(|(_, c)| c.iter().copied()).collect();
    let Some((x_min, x_max)) = x_range(&all) else {
        return "Plot: no ILT curves to draw.\n".to_string();
    };

    let mut header = format!(
        "Plot: T1=[{:.3e}, {:.3e}] us (log) | ",
        10f64.powf(x_min),
        10f64.powf(x_max)
    );
    let legend: Vec<String> = sweep
        .curves
        .iter()
        .zip(CURVE_MARKS.iter().cycle())
        .map(|(c, mark)| format!("{mark}: alpha={}", c.alpha))
        .collect();
    header.push_str(&legend.join(", "));

    render_plot(&header, &[], &curves, (x_min, x_max), width, height)
}

fn render_plot(
    header: &str,
    points: &[(f64, f64)],
    curves: &[(char, Vec<(f64, f64)>)],
    (x_min, x_max): (f64, f64),
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let all_y = points
        .iter()
        .chain(curves.iter().flat_map(|(_, c)| c.iter()))
        .map(|&(_, y)| y);
    let (y_min, y_max) = y_range(all_y).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Draw curves first (so points can overlay).
    for (mark, curve) in curves {
        draw_curve(&mut grid, curve, *mark, (x_min, x_max), (y_min, y_max));
    }
    for &(x, y) in points {
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        grid[row][col] = 'o';
    }

    let mut out = String::new();
    out.push_str(header);
    out.push_str(&format!(" | y=[{y_min:.3e}, {y_max:.3e}]\n"));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn x_range(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    for &(x, _) in points {
        min_x = min_x.min(x);
        max_x = max_x.max(x);
    }
    if min_x.is_finite() && max_x.is_finite() && max_x > min_x {
        Some((min_x, max_x))
    } else {
        None
    }
}

fn y_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for y in values.filter(|y| y.is_finite()) {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], mark: char, xr: (f64, f64), yr: (f64, f64)) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve.iter().filter(|(_, y)| y.is_finite()) {
        let col = map_x(x, xr.0, xr.1, width);
        let row = map_y(y, yr.0, yr.1, height);
        match prev {
            Some((c0, r0)) => draw_line(grid, c0, r0, col, row, mark),
            None => {
                if grid[row][col] == ' ' {
                    grid[row][col] = mark;
                }
            }
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CurveSamples, IltCurve, RelaxationModel, RelaxationParams};

    fn flat_fit() -> RelaxationFit {
        // s = -1 makes the law a constant y0.
        let params = RelaxationParams {
            y0: 5.0,
            s: -1.0,
            t1: 10.0,
            r: 1.0,
        };
        RelaxationFit {
            model: RelaxationModel::Spin72,
            params,
            curve: CurveSamples {
                t: vec![1.0, 1000.0],
                y: vec![5.0, 5.0],
            },
            observed: vec![4.0, 6.0],
            normalized: false,
            sse: 2.0,
            rmse: 1.0,
            generations: 1,
        }
    }

    #[test]
    fn recovery_plot_golden_snapshot_small() {
        let txt = render_recovery_plot(&flat_fit(), 10, 5);
        let expected = concat!(
            "Plot: delay=[1.000e0, 1.000e3] us (log) | fit 7/2 Spin | y=[3.900e0, 6.100e0]\n",
            "         o\n",
            "          \n",
            "----------\n",
            "          \n",
            "o         \n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn ilt_plot_has_one_mark_per_alpha() {
        let grid = vec![1e5, 1e6, 1e7];
        let sweep = IltSweep {
            curves: vec![
                IltCurve {
                    alpha: 1.0,
                    t1_grid: grid.clone(),
                    distribution: vec![0.1, 0.8, 0.1],
                    objective: 0.0,
                    iterations: 1,
                },
                IltCurve {
                    alpha: 10.0,
                    t1_grid: grid,
                    distribution: vec![0.3, 0.4, 0.3],
                    objective: 0.0,
                    iterations: 1,
                },
            ],
            skipped: Vec::new(),
        };
        let txt = render_ilt_plot(&sweep, 20, 8);
        assert!(txt.starts_with("Plot: T1=[1.000e5, 1.000e7] us (log) | 1: alpha=1, 2: alpha=10"));
        assert_eq!(txt.lines().count(), 9);
        assert!(txt.lines().skip(1).any(|l| l.contains('1')));
        assert!(txt.lines().skip(1).any(|l| l.contains('2')));
    }

    #[test]
    fn degenerate_inputs_do_not_panic() {
        let mut fit = flat_fit();
        fit.curve.t = vec![0.0, 0.0];
        assert!(render_recovery_plot(&fit, 10, 5).contains("not enough"));
        assert!(render_ilt_plot(&IltSweep::default(), 10, 5).contains("no ILT curves"));
    }
}
