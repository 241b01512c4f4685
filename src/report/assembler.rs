use dedent::dedent;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::{
    agent::{StageSchema, collapse_blank_lines},
    constants::NOT_DOCUMENTED,
    error::{Error, Result},
    value::{PatientRecord, ReportType, Stage, fields},
    workflow::{RunState, WorkflowRun},
};

/// Heading of the section a stage's output is rendered under.
pub fn section_title(stage: Stage, report_type: ReportType) -> &'static str {
    match (stage, report_type) {
        (Stage::SymptomAnalyzer, _) => "Symptom Analysis",
        (Stage::DiagnosisAdvisor, _) => "Diagnosis",
        (Stage::TreatmentRecommender, _) => "Treatment Plan",
        (Stage::ReportComposer, ReportType::AdmissionRecord) => "Admission Narrative",
        (Stage::ReportComposer, ReportType::OperativeNote) => "Operation Record",
        (Stage::ReportComposer, ReportType::PreliminaryDiagnosis) => "Summary",
    }
}

fn header_fields(report_type: ReportType) -> &'static [(&'static str, &'static str)] {
    match report_type {
        ReportType::PreliminaryDiagnosis => &[
            ("Patient ID", fields::PATIENT_ID),
            ("Name", fields::NAME),
            ("Age", fields::AGE),
            ("Sex", fields::SEX),
            ("Chief Complaint", fields::CHIEF_COMPLAINT),
        ],
        ReportType::AdmissionRecord => &[
            ("Patient ID", fields::PATIENT_ID),
            ("Name", fields::NAME),
            ("Age", fields::AGE),
            ("Sex", fields::SEX),
            ("Department", fields::DEPARTMENT),
            ("Admission Time", fields::ADMISSION_TIME),
            ("Chief Complaint", fields::CHIEF_COMPLAINT),
        ],
        ReportType::OperativeNote => &[
            ("Patient ID", fields::PATIENT_ID),
            ("Name", fields::NAME),
            ("Age", fields::AGE),
            ("Sex", fields::SEX),
            ("Operation", fields::OPERATION_NAME),
            ("Operation Date", fields::OPERATION_DATE),
            ("Surgeon", fields::SURGEON),
            ("Anesthesia", fields::ANESTHESIA),
        ],
    }
}

#[derive(Serialize)]
struct Line {
    label: &'static str,
    value: String,
}

#[derive(Serialize)]
struct Section {
    title: &'static str,
    fields: Vec<Line>,
}

fn header(patient: &PatientRecord, report_type: ReportType) -> Vec<Line> {
    let mut lines = header_fields(report_type)
        .iter()
        .map(|&(label, key)| Line {
            label,
            value: patient.text(key).unwrap_or_else(|| NOT_DOCUMENTED.to_owned()),
        })
        .collect::<Vec<_>>();
    let vitals = patient.vitals();
    if !vitals.is_empty() {
        lines.push(Line {
            label: "Vital Signs",
            value: vitals.describe(),
        });
    }
    lines
}

/// Renders a finished [`WorkflowRun`] into a markdown report.
///
/// The same run always renders to the same text.
#[derive(Debug)]
pub struct ReportAssembler {
    env: Environment<'static>,
}

impl ReportAssembler {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("header", HEADER_TEMPLATE)?;
        env.add_template("sections", SECTIONS_TEMPLATE)?;
        env.add_template("disclaimer", DISCLAIMER_TEMPLATE)?;
        env.add_template(template_name(ReportType::PreliminaryDiagnosis), PRELIMINARY_TEMPLATE)?;
        env.add_template(template_name(ReportType::AdmissionRecord), ADMISSION_TEMPLATE)?;
        env.add_template(template_name(ReportType::OperativeNote), OPERATIVE_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn assemble(&self, run: &WorkflowRun) -> Result<String> {
        if !matches!(run.state(), RunState::Completed | RunState::PartialFailure) {
            return Err(Error::InvalidTransition(format!(
                "run {} cannot be assembled in state {:?}",
                run.id(),
                run.state()
            )));
        }
        let report_type = run.report_type();
        let sections = report_type
            .stages()
            .iter()
            .map(|stage| {
                let schema = StageSchema::of(*stage, report_type);
                let output = run.output(*stage);
                Section {
                    title: section_title(*stage, report_type),
                    fields: schema
                        .fields()
                        .map(|slot| Line {
                            label: slot.label,
                            value: output
                                .and_then(|o| o.field(slot.key))
                                .unwrap_or(NOT_DOCUMENTED)
                                .to_owned(),
                        })
                        .collect(),
                }
            })
            .collect::<Vec<_>>();
        let flagged = report_type
            .stages()
            .iter()
            .filter(|stage| run.is_flagged(**stage))
            .map(|stage| section_title(*stage, report_type))
            .collect::<Vec<_>>();

        let template = self.env.get_template(template_name(report_type))?;
        let report = template.render(context! {
            title => report_type.title(),
            header => header(run.patient(), report_type),
            sections => sections,
            flagged => flagged,
        })?;
        Ok(collapse_blank_lines(report.trim()))
    }
}

fn template_name(report_type: ReportType) -> &'static str {
    match report_type {
        ReportType::PreliminaryDiagnosis => "preliminary_diagnosis",
        ReportType::AdmissionRecord => "admission_record",
        ReportType::OperativeNote => "operative_note",
    }
}

/// Marker line opening the disclaimer block.
pub const DISCLAIMER_MARKER: &str = "> **Disclaimer**";

const HEADER_TEMPLATE: &str = dedent!(r#"
    {%- for line in header %}
    **{{ line.label }}**: {{ line.value }}
    {%- endfor %}
    "#);

const SECTIONS_TEMPLATE: &str = dedent!(r#"
    {%- for section in sections %}

    ## {{ section.title }}
    {%- for line in section.fields %}
    **{{ line.label }}**: {{ line.value }}
    {%- endfor %}
    {%- endfor %}
    "#);

const DISCLAIMER_TEMPLATE: &str = dedent!(r#"
    {%- if flagged %}

    > **Disclaimer**: the following sections were generated with low confidence and must be reviewed by a clinician before use: {{ flagged | join(", ") }}.
    {%- endif %}
    "#);

const PRELIMINARY_TEMPLATE: &str = dedent!(r#"
    # {{ title }}

    {% include "header" %}
    {% include "sections" %}
    {% include "disclaimer" %}
    "#);

const ADMISSION_TEMPLATE: &str = dedent!(r#"
    # {{ title }}

    {% include "header" %}
    {% include "sections" %}
    {% include "disclaimer" %}

    Recorded by the attending physician on admission.
    "#);

const OPERATIVE_TEMPLATE: &str = dedent!(r#"
    # {{ title }}

    {% include "header" %}
    {% include "sections" %}
    {% include "disclaimer" %}

    Operative note to be countersigned by the operating surgeon.
    "#);
