//! Machine-readable run report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::pipeline::RunOutput;
use crate::domain::{FilterConfig, FitConfig, RelaxationModel};
use crate::error::AppError;
use crate::report::format::source_label;

/// Settings echoed back in the report so a run can be reproduced.
#[derive(Debug, Clone, Serialize)]
pub struct ReportConfig {
    pub source: String,
    pub filter: FilterConfig,
    pub model: RelaxationModel,
    pub normalize: bool,
    pub seed: u64,
    pub max_generations: usize,
    pub ilt: bool,
}

/// JSON document printed by `tnmr fit --json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport<'a> {
    pub tool: &'static str,
    pub version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub config: ReportConfig,
    pub output: &'a RunOutput,
}

impl<'a> RunReport<'a> {
    pub fn new(output: &'a RunOutput, config: &FitConfig, generated_at: DateTime<Utc>) -> Self {
        Self {
            tool: "tnmr",
            version: env!("CARGO_PKG_VERSION"),
            generated_at,
            config: ReportConfig {
                source: source_label(&config.source),
                filter: config.filter,
                model: config.model,
                normalize: config.normalize,
                seed: config.seed,
                max_generations: config.max_generations,
                ilt: config.ilt,
            },
            output,
        }
    }
}

/// Pretty-printed JSON report stamped with the current time.
pub fn to_json_report(output: &RunOutput, config: &FitConfig) -> Result<String, AppError> {
    let report = RunReport::new(output, config, Utc::now());
    Ok(serde_json::to_string_pretty(&report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StageOutcome;
    use chrono::TimeZone;

    #[test]
    fn report_carries_stage_status_and_timestamp() {
        let output = RunOutput {
            records: 1,
            samples: 4,
            autophase: None,
            phases: vec![0.0],
            pivots: vec![0.0],
            spectral_pivots: (-0.5, 0.5),
            window: None,
            delay_times: None,
            intensities: vec![1.0],
            fit: StageOutcome::Skipped("no delay-time metadata".to_string()),
            ilt: StageOutcome::Failed("did not converge".to_string()),
            field_scan: StageOutcome::Skipped("no field metadata".to_string()),
        };
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let report = RunReport::new(&output, &FitConfig::default(), at);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["tool"], "tnmr");
        assert_eq!(value["generated_at"], "2025-01-02T03:04:05Z");
        assert_eq!(value["config"]["filter"]["kind"], "sinc");
        assert_eq!(value["output"]["fit"]["status"], "skipped");
        assert_eq!(value["output"]["ilt"]["value"], "did not converge");
    }
}
