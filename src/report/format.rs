//! Formatted terminal output for an analysis run.
//!
//! We keep formatting code in one place so:
//! - the signal and fitting code stays clean and testable
//! - output changes are localized (the tests below pin the layout)

use crate::app::pipeline::RunOutput;
use crate::domain::{DataSource, FitConfig, IltSweep, RelaxationFit, StageOutcome};
use crate::signal::FieldScanPoint;

/// Format the full run summary (dataset + conditioning + fit + ILT + field scan).
pub fn format_run_summary(output: &RunOutput, config: &FitConfig) -> String {
    let mut out = String::new();

    out.push_str("=== tnmr - T1 relaxation analysis ===\n");
    out.push_str(&format!("Source: {}\n", source_label(&config.source)));
    out.push_str(&format!(
        "Records: n={} | samples={}\n",
        output.records, output.samples
    ));
    out.push_str(&format!(
        "Filter: {} (width {}) | phase={} deg | pivot={} us\n",
        config.filter.kind.display_name(),
        config.filter.width,
        fmt_shared(&output.phases),
        fmt_shared(&output.pivots),
    ));
    if let Some(a) = &output.autophase {
        out.push_str(&format!(
            "Autophase: record {} peak at t={:.4} us ({:.2} deg) -> phase {:.2} deg\n",
            a.index, a.peak_time, a.peak_angle, a.phase
        ));
    }

    let (left, right) = output.spectral_pivots;
    match output.window {
        Some(w) => out.push_str(&format!(
            "Spectral window: [{left}, {right}] MHz -> bins [{}, {})\n",
            w.start, w.end
        )),
        None => out.push_str(&format!("Spectral window: [{left}, {right}] MHz -> (empty axis)\n")),
    }

    out.push('\n');
    out.push_str(&format_intensity_table(output));

    out.push_str(&format!("\nRelaxation fit ({}):\n", output.fit.label()));
    match &output.fit {
        StageOutcome::Completed(fit) => out.push_str(&format_fit(fit)),
        StageOutcome::Failed(reason) | StageOutcome::Skipped(reason) => {
            out.push_str(&format!("  {reason}\n"));
        }
    }

    out.push_str(&format!("\nInverse Laplace sweep ({}):\n", output.ilt.label()));
    match &output.ilt {
        StageOutcome::Completed(sweep) => out.push_str(&format_ilt(sweep)),
        StageOutcome::Failed(reason) | StageOutcome::Skipped(reason) => {
            out.push_str(&format!("  {reason}\n"));
        }
    }

    out.push_str(&format!("\nField scan ({}):\n", output.field_scan.label()));
    match &output.field_scan {
        StageOutcome::Completed(points) => out.push_str(&format_field_scan(points)),
        StageOutcome::Failed(reason) | StageOutcome::Skipped(reason) => {
            out.push_str(&format!("  {reason}\n"));
        }
    }

    out
}

fn format_fit(fit: &RelaxationFit) -> String {
    let mut out = String::new();
    out.push_str(&format!("- model: {}\n", fit.model.display_name()));
    for (label, value) in fit.labeled_params() {
        out.push_str(&format!("- {label:<3}: {}\n", fmt_sig(value)));
    }
    out.push_str(&format!(
        "- SSE={} RMSE={} generations={}{}\n",
        fmt_sig(fit.sse),
        fmt_sig(fit.rmse),
        fit.generations,
        if fit.normalized { " (normalized)" } else { "" }
    ));
    out
}

fn format_ilt(sweep: &IltSweep) -> String {
    let mut out = String::new();
    for curve in &sweep.curves {
        let peak = curve.peak_t1().map(fmt_sig).unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "  alpha={:<8} peak T1={peak} us objective={} iterations={}\n",
            curve.alpha,
            fmt_sig(curve.objective),
            curve.iterations
        ));
    }
    for skip in &sweep.skipped {
        out.push_str(&format!("  (skipped alpha={}) {}\n", skip.alpha, skip.reason));
    }
    out
}

fn format_intensity_table(output: &RunOutput) -> String {
    let mut out = String::new();
    push_row(&mut out, format!("{:>6} {:>14} {:>14}", "record", "delay_us", "intensity"));
    push_row(&mut out, format!("{:->6} {:->14} {:->14}", "", "", ""));
    for (i, y) in output.intensities.iter().enumerate() {
        let delay = output
            .delay_times
            .as_ref()
            .and_then(|d| d.get(i))
            .map(|&t| fmt_sig(t))
            .unwrap_or_else(|| "-".to_string());
        push_row(&mut out, format!("{i:>6} {delay:>14} {:>14}", fmt_sig(*y)));
    }
    out
}

fn format_field_scan(points: &[FieldScanPoint]) -> String {
    let mut out = String::new();
    push_row(
        &mut out,
        format!("{:>12} {:>12} {:>12} {:>12} {:>12}", "field_oe", "re_sum", "im_sum", "|sum|", "pivot_mag"),
    );
    push_row(&mut out, format!("{:->12} {:->12} {:->12} {:->12} {:->12}", "", "", "", "", ""));
    for p in points {
        push_row(
            &mut out,
            format!(
                "{:>12.2} {:>12} {:>12} {:>12} {:>12}",
                p.field,
                fmt_sig(p.real_integral),
                fmt_sig(p.imag_integral),
                fmt_sig(p.integral_magnitude),
                fmt_sig(p.pivot_magnitude)
            ),
        );
    }
    out
}

fn push_row(out: &mut String, row: String) {
    out.push_str(row.trim_end());
    out.push('\n');
}

pub(crate) fn source_label(source: &DataSource) -> String {
    match source {
        DataSource::Container(path) => path.display().to_string(),
        DataSource::Synthetic(s) => format!(
            "synthetic (T1={} us, y0={}, s={}, noise={}, seed {})",
            s.params.t1, s.params.y0, s.params.s, s.noise, s.seed
        ),
    }
}

/// One value when every record shares it, otherwise `mixed`.
fn fmt_shared(values: &[f64]) -> String {
    match values.first() {
        None => "-".to_string(),
        Some(first) if values.iter().all(|v| v == first) => format!("{first:.2}"),
        Some(_) => "mixed".to_string(),
    }
}

fn fmt_sig(v: f64) -> String {
    if v == 0.0 || (1e-3..1e5).contains(&v.abs()) {
        format!("{v:.4}")
    } else {
        format!("{v:.4e}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IltCurve, IltSkip, SynthConfig};

    fn output() -> RunOutput {
        RunOutput {
            records: 2,
            samples: 8,
            autophase: None,
            phases: vec![30.0, 30.0],
            pivots: vec![0.0, 1.0],
            spectral_pivots: (-0.5, 0.5),
            window: None,
            delay_times: None,
            intensities: vec![1.5, 2.0],
            fit: StageOutcome::Skipped("no delay-time metadata".to_string()),
            ilt: StageOutcome::Skipped("disabled".to_string()),
            field_scan: StageOutcome::Skipped("no field metadata".to_string()),
        }
    }

    #[test]
    fn skipped_stages_show_their_reason() {
        let txt = format_run_summary(&output(), &FitConfig::default());
        assert!(txt.contains("Relaxation fit (skipped):\n  no delay-time metadata\n"));
        assert!(txt.contains("Inverse Laplace sweep (skipped):\n  disabled\n"));
        assert!(txt.contains("phase=30.00 deg | pivot=mixed us"));
        assert!(txt.contains("(empty axis)"));
    }

    #[test]
    fn intensity_table_has_one_row_per_record() {
        let table = format_intensity_table(&output());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], "     0              -         1.5000");
        assert!(lines.iter().all(|l| !l.ends_with(' ')));
    }

    #[test]
    fn ilt_lines_list_peaks_and_skips() {
        let sweep = IltSweep {
            curves: vec![IltCurve {
                alpha: 10.0,
                t1_grid: vec![1e5, 1e6],
                distribution: vec![0.2, 0.8],
                objective: 0.5,
                iterations: 12,
            }],
            skipped: vec![IltSkip {
                alpha: 1.0,
                reason: "did not converge".to_string(),
            }],
        };
        let txt = format_ilt(&sweep);
        assert!(txt.contains("peak T1=1.0000e6 us"));
        assert!(txt.contains("(skipped alpha=1) did not converge"));
    }

    #[test]
    fn synthetic_source_is_described() {
        let label = source_label(&DataSource::Synthetic(SynthConfig::default()));
        assert!(label.starts_with("synthetic (T1=1000000 us"));
    }
}
