use serde::{Deserialize, Serialize};

use super::section_title;
use crate::{constants::NOT_DOCUMENTED, value::ReportType};

/// Completeness below this percentage adds a general suggestion.
const COMPLETENESS_TARGET: f32 = 80.0;

/// Quality summary attached to every assembled report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEvaluation {
    /// Percentage of required section headings present, in `[0, 100]`.
    pub completeness: f32,
    pub suggestions: Vec<String>,
}

impl ReportEvaluation {
    pub fn evaluate(report: &str, report_type: ReportType) -> Self {
        let required = report_type
            .stages()
            .iter()
            .map(|stage| section_title(*stage, report_type))
            .collect::<Vec<_>>();
        let headings = report
            .lines()
            .filter_map(|line| line.strip_prefix("## "))
            .map(str::trim)
            .collect::<Vec<_>>();

        let mut suggestions = Vec::new();
        let mut present = 0;
        for title in &required {
            if headings.contains(title) {
                present += 1;
            } else {
                suggestions.push(format!("Add the missing \"{}\" section.", title));
            }
        }

        let mut section = None;
        for line in report.lines() {
            if let Some(heading) = line.strip_prefix("## ") {
                section = Some(heading.trim());
                continue;
            }
            if let Some(rest) = line.strip_prefix("**")
                && let Some((label, value)) = rest.split_once("**:")
                && value.trim() == NOT_DOCUMENTED
            {
                match section {
                    Some(section) => {
                        suggestions.push(format!("Document \"{}\" in \"{}\".", label, section))
                    }
                    None => suggestions.push(format!("Document \"{}\" in the header.", label)),
                }
            }
        }

        let completeness = if required.is_empty() {
            100.0
        } else {
            present as f32 / required.len() as f32 * 100.0
        };
        if completeness < COMPLETENESS_TARGET {
            suggestions.push(format!(
                "Only {:.0}% of the required sections are present; regenerate the report.",
                completeness
            ));
        }
        Self {
            completeness,
            suggestions,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.suggestions.is_empty()
    }
}
