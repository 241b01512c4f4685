use crate::value::{ReportType, Stage, slots};

/// One named field an agent is asked to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: &'static str,
    /// Label shown to the model and used as the section heading.
    pub label: &'static str,
    /// Other headings the parser accepts for this field.
    pub aliases: &'static [&'static str],
}

const fn field(
    key: &'static str,
    label: &'static str,
    aliases: &'static [&'static str],
) -> FieldSpec {
    FieldSpec {
        key,
        label,
        aliases,
    }
}

const FINDINGS: FieldSpec = field(
    slots::FINDINGS,
    "Findings",
    &["symptoms", "key findings", "symptom analysis", "clinical findings"],
);
const RISK_LEVEL: FieldSpec = field(slots::RISK_LEVEL, "Risk Level", &["risk", "severity"]);
const FLAGS: FieldSpec = field(slots::FLAGS, "Flags", &["red flags", "alerts", "warning signs"]);

const DIAGNOSIS: FieldSpec = field(
    slots::DIAGNOSIS,
    "Diagnosis",
    &["preliminary diagnosis", "primary diagnosis", "impression", "most likely diagnosis"],
);
const DIFFERENTIAL: FieldSpec = field(
    slots::DIFFERENTIAL,
    "Differential",
    &["differential diagnosis", "differential diagnoses", "differentials"],
);
const RATIONALE: FieldSpec = field(slots::RATIONALE, "Rationale", &["reasoning", "basis", "evidence"]);

const PLAN: FieldSpec = field(
    slots::PLAN,
    "Plan",
    &["treatment", "treatment plan", "recommendation", "recommendations"],
);
const MEDICATIONS: FieldSpec = field(slots::MEDICATIONS, "Medications", &["medication", "drugs", "prescription"]);
const FOLLOW_UP: FieldSpec = field(slots::FOLLOW_UP, "Follow Up", &["followup", "follow up plan"]);
const PRECAUTIONS: FieldSpec = field(slots::PRECAUTIONS, "Precautions", &["warnings", "cautions", "notes"]);

const SUMMARY: FieldSpec = field(slots::SUMMARY, "Summary", &["overview", "conclusion"]);
const PRESENT_ILLNESS: FieldSpec = field(
    slots::PRESENT_ILLNESS,
    "Present Illness",
    &["history of present illness", "hpi"],
);
const PHYSICAL_EXAM: FieldSpec = field(
    slots::PHYSICAL_EXAM,
    "Physical Exam",
    &["physical examination", "examination"],
);
const AUXILIARY_EXAM: FieldSpec = field(
    slots::AUXILIARY_EXAM,
    "Auxiliary Exam",
    &["auxiliary examination", "investigations", "tests"],
);
const PREOPERATIVE_DIAGNOSIS: FieldSpec = field(
    slots::PREOPERATIVE_DIAGNOSIS,
    "Preoperative Diagnosis",
    &["pre operative diagnosis"],
);
const OPERATION_PROCESS: FieldSpec = field(
    slots::OPERATION_PROCESS,
    "Operation Process",
    &["procedure", "operative procedure", "operation steps", "operative findings"],
);
const OPERATION_RESULT: FieldSpec = field(slots::OPERATION_RESULT, "Operation Result", &["outcome", "result"]);
const POSTOPERATIVE_DIAGNOSIS: FieldSpec = field(
    slots::POSTOPERATIVE_DIAGNOSIS,
    "Postoperative Diagnosis",
    &["post operative diagnosis"],
);

/// Fields a stage's agent must and may produce for a report type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageSchema {
    pub required: &'static [FieldSpec],
    pub optional: &'static [FieldSpec],
}

impl StageSchema {
    pub fn of(stage: Stage, report_type: ReportType) -> Self {
        let (required, optional): (&'static [FieldSpec], &'static [FieldSpec]) =
            match (stage, report_type) {
                (Stage::SymptomAnalyzer, _) => (&[FINDINGS, RISK_LEVEL], &[FLAGS]),
                (Stage::DiagnosisAdvisor, _) => (&[DIAGNOSIS], &[DIFFERENTIAL, RATIONALE]),
                (Stage::TreatmentRecommender, _) => {
                    (&[PLAN], &[MEDICATIONS, FOLLOW_UP, PRECAUTIONS])
                }
                (Stage::ReportComposer, ReportType::AdmissionRecord) => (
                    &[PRESENT_ILLNESS, PHYSICAL_EXAM],
                    &[AUXILIARY_EXAM, SUMMARY],
                ),
                (Stage::ReportComposer, ReportType::OperativeNote) => (
                    &[OPERATION_PROCESS, OPERATION_RESULT],
                    &[PREOPERATIVE_DIAGNOSIS, POSTOPERATIVE_DIAGNOSIS],
                ),
                (Stage::ReportComposer, ReportType::PreliminaryDiagnosis) => (&[SUMMARY], &[]),
            };
        Self { required, optional }
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static FieldSpec> {
        self.required.iter().chain(self.optional.iter())
    }

    /// Finds the field a heading refers to, ignoring case and punctuation.
    pub fn lookup(&self, heading: &str) -> Option<&'static FieldSpec> {
        let heading = normalize_heading(heading);
        self.fields().find(|f| {
            normalize_heading(f.key) == heading
                || normalize_heading(f.label) == heading
                || f.aliases.iter().any(|a| normalize_heading(a) == heading)
        })
    }

    pub fn label_of(&self, key: &str) -> Option<&'static str> {
        self.fields().find(|f| f.key == key).map(|f| f.label)
    }
}

/// Lowercases and collapses separators, so `Follow-Up`, `follow_up` and
/// `**Follow up**` compare equal.
pub(crate) fn normalize_heading(heading: &str) -> String {
    heading
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
