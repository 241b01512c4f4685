use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// One report-generation stage, each handled by its own agent.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString, EnumIter,
)]
pub enum Stage {
    SymptomAnalyzer,
    DiagnosisAdvisor,
    TreatmentRecommender,
    ReportComposer,
}

impl Stage {
    /// Key under which the stage's output is exposed to templates.
    pub fn slot_key(&self) -> &'static str {
        match self {
            Stage::SymptomAnalyzer => "symptom_analyzer",
            Stage::DiagnosisAdvisor => "diagnosis_advisor",
            Stage::TreatmentRecommender => "treatment_recommender",
            Stage::ReportComposer => "report_composer",
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportType {
    PreliminaryDiagnosis,
    AdmissionRecord,
    OperativeNote,
}

impl ReportType {
    /// The fixed, ordered list of stages a run of this report type must complete.
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            ReportType::PreliminaryDiagnosis => &[
                Stage::SymptomAnalyzer,
                Stage::DiagnosisAdvisor,
                Stage::TreatmentRecommender,
            ],
            ReportType::AdmissionRecord => &[
                Stage::SymptomAnalyzer,
                Stage::DiagnosisAdvisor,
                Stage::TreatmentRecommender,
                Stage::ReportComposer,
            ],
            ReportType::OperativeNote => &[
                Stage::DiagnosisAdvisor,
                Stage::ReportComposer,
                Stage::TreatmentRecommender,
            ],
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReportType::PreliminaryDiagnosis => "Preliminary Diagnosis Report",
            ReportType::AdmissionRecord => "Admission Record",
            ReportType::OperativeNote => "Operative Note",
        }
    }

    pub fn stage_index(&self, stage: Stage) -> Option<usize> {
        self.stages().iter().position(|s| *s == stage)
    }
}
