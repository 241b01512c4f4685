use dedent::dedent;
use minijinja::{Environment, context};
use serde::Serialize;

use super::schema::StageSchema;
use crate::{
    constants::PROMPT_DOCUMENT_MAX_GRAPHEMES,
    error::Result,
    knowledge::rules::clinical_hints,
    utils::truncate_ellipsis,
    value::{AgentInput, Stage},
};

#[derive(Serialize)]
struct PromptDocument {
    source: String,
    text: String,
}

#[derive(Serialize)]
struct PromptField {
    label: &'static str,
    value: String,
}

#[derive(Serialize)]
struct PromptUpstream {
    stage: String,
    fields: Vec<PromptField>,
}

/// Renders the per-stage prompt templates.
#[derive(Debug)]
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("context", CONTEXT_TEMPLATE)?;
        env.add_template("format", FORMAT_TEMPLATE)?;
        env.add_template("symptom_analyzer", SYMPTOM_ANALYZER_TEMPLATE)?;
        env.add_template("diagnosis_advisor", DIAGNOSIS_ADVISOR_TEMPLATE)?;
        env.add_template("treatment_recommender", TREATMENT_RECOMMENDER_TEMPLATE)?;
        env.add_template("report_composer", REPORT_COMPOSER_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn render(&self, stage: Stage, input: &AgentInput, schema: &StageSchema) -> Result<String> {
        let vitals = input.patient.vitals();
        let documents = input
            .context
            .chunks()
            .map(|c| PromptDocument {
                source: c.source_id.clone(),
                text: truncate_ellipsis(&c.text, PROMPT_DOCUMENT_MAX_GRAPHEMES).into_owned(),
            })
            .collect::<Vec<_>>();
        let upstream = input
            .upstream
            .iter()
            .map(|o| {
                let schema = StageSchema::of(o.stage, input.report_type);
                PromptUpstream {
                    stage: o.stage.to_string(),
                    fields: o
                        .fields
                        .iter()
                        .map(|(k, v)| PromptField {
                            label: schema.label_of(k).unwrap_or("Note"),
                            value: v.clone(),
                        })
                        .collect(),
                }
            })
            .collect::<Vec<_>>();
        let required = schema.required.iter().map(|f| f.label).collect::<Vec<_>>();
        let optional = schema.optional.iter().map(|f| f.label).collect::<Vec<_>>();

        let template = self.env.get_template(stage.slot_key())?;
        let prompt = template.render(context! {
            report_title => input.report_type.title(),
            patient => input.patient.summary(),
            vitals => (!vitals.is_empty()).then(|| vitals.describe()),
            hints => clinical_hints(&vitals),
            documents => documents,
            upstream => upstream,
            required => required,
            optional => optional,
        })?;
        Ok(collapse_blank_lines(prompt.trim()))
    }
}

/// Included blocks may leave runs of blank lines behind; keep at most one.
pub(crate) fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.truncate(out.trim_end().len());
    out
}

const CONTEXT_TEMPLATE: &str = dedent!(r#"
    # Patient
    {{ patient if patient else "No structured patient information." }}
    {%- if vitals %}
    Vital signs: {{ vitals }}
    {%- endif %}
    {%- if hints %}

    # Clinical hints
    {%- for hint in hints %}
    - {{ hint }}
    {%- endfor %}
    {%- endif %}
    {%- if upstream %}

    # Earlier findings
    {%- for output in upstream %}
    ## {{ output.stage }}
    {%- for field in output.fields %}
    {{ field.label }}: {{ field.value }}
    {%- endfor %}
    {%- endfor %}
    {%- endif %}
    {%- if documents %}

    # Reference knowledge
    <documents>
    {%- for doc in documents %}
    <document source="{{ doc.source }}">
    {{ doc.text }}
    </document>
    {%- endfor %}
    </documents>
    {%- endif %}
    "#);

const FORMAT_TEMPLATE: &str = dedent!(r#"
    # Output format
    Answer with one line per field, written as `Label: value`. A value may continue on the following lines.
    Required fields:
    {%- for label in required %}
    - {{ label }}
    {%- endfor %}
    {%- if optional %}
    Optional fields:
    {%- for label in optional %}
    - {{ label }}
    {%- endfor %}
    {%- endif %}
    End with `Confidence: <number between 0 and 1>`.
    "#);

const SYMPTOM_ANALYZER_TEMPLATE: &str = dedent!(r#"
    You are a clinical symptom analyst preparing a {{ report_title }}.
    Summarise the key findings from the complaint, history and vital signs, and grade the risk level as low, moderate or high. List red flags that need urgent attention.

    {% include "context" %}

    {% include "format" %}
    "#);

const DIAGNOSIS_ADVISOR_TEMPLATE: &str = dedent!(r#"
    You are a diagnostic advisor preparing a {{ report_title }}.
    Using the earlier findings and the reference knowledge, state the most likely diagnosis, the differential diagnoses worth excluding, and the rationale.

    {% include "context" %}

    {% include "format" %}
    "#);

const TREATMENT_RECOMMENDER_TEMPLATE: &str = dedent!(r#"
    You are a treatment advisor preparing a {{ report_title }}.
    Recommend a treatment plan for the diagnosis above, with medications, follow-up and precautions. Follow the reference knowledge where it applies.

    {% include "context" %}

    {% include "format" %}
    "#);

const REPORT_COMPOSER_TEMPLATE: &str = dedent!(r#"
    You are a medical scribe writing the narrative sections of a {{ report_title }}.
    Write in formal clinical language, use only the facts given below, and do not invent examination results.

    {% include "context" %}

    {% include "format" %}
    "#);

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, sync::Arc};

    use indexmap::IndexMap;

    use super::*;
    use crate::value::{
        AgentOutput, KnowledgeChunk, PatientRecord, ReportType, RetrievalResult, ScoredChunk,
        fields, slots,
    };

    fn input() -> AgentInput {
        let patient = PatientRecord::new()
            .with_field(fields::CHIEF_COMPLAINT, "chest pain")
            .with_field(fields::SYSTOLIC, 160)
            .with_field(fields::DIASTOLIC, 100);
        let chunk = KnowledgeChunk {
            id: "htn@v1#0".into(),
            source_id: "htn".into(),
            ordinal: 0,
            text: "Stage 2 hypertension: 160-179/100-109 mmHg.".into(),
            embedding: Default::default(),
            tags: BTreeSet::new(),
            version: 1,
        };
        AgentInput {
            report_type: ReportType::PreliminaryDiagnosis,
            patient: Arc::new(patient),
            context: RetrievalResult::new(vec![ScoredChunk { chunk, score: 0.8 }], 5),
            upstream: vec![AgentOutput {
                stage: Stage::SymptomAnalyzer,
                text: String::new(),
                fields: IndexMap::from([(slots::FINDINGS.to_owned(), "acute chest pain".to_owned())]),
                confidence: 0.9,
                missing_fields: vec![],
                attempts: 1,
            }],
        }
    }

    #[test]
    fn renders_patient_knowledge_and_format() {
        let builder = PromptBuilder::new().unwrap();
        let input = input();
        let schema = StageSchema::of(Stage::DiagnosisAdvisor, input.report_type);
        let prompt = builder.render(Stage::DiagnosisAdvisor, &input, &schema).unwrap();

        assert!(prompt.starts_with("You are a diagnostic advisor preparing a Preliminary Diagnosis Report."));
        assert!(prompt.contains("chief_complaint: chest pain"));
        assert!(prompt.contains("Vital signs: BP 160/100 mmHg"));
        assert!(prompt.contains("- stage 2 hypertension"));
        assert!(prompt.contains("## SymptomAnalyzer\nFindings: acute chest pain"));
        assert!(prompt.contains("<document source=\"htn\">\nStage 2 hypertension: 160-179/100-109 mmHg.\n</document>"));
        assert!(prompt.contains("Required fields:\n- Diagnosis"));
        assert!(prompt.contains("Optional fields:\n- Differential\n- Rationale"));
    }

    #[test]
    fn blank_line_runs_are_collapsed() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb  \n\n"), "a\n\nb");
    }

    #[test]
    fn omits_empty_blocks() {
        let builder = PromptBuilder::new().unwrap();
        let mut input = input();
        input.context = RetrievalResult::empty();
        input.upstream.clear();
        let schema = StageSchema::of(Stage::SymptomAnalyzer, input.report_type);
        let prompt = builder.render(Stage::SymptomAnalyzer, &input, &schema).unwrap();
        assert!(!prompt.contains("<documents>"));
        assert!(!prompt.contains("# Earlier findings"));
    }
}
