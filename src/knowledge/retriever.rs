use std::{collections::BTreeSet, sync::Arc};

use super::{KnowledgeBase, rules::clinical_tags};
use crate::{
    config::RetrievalConfig,
    error::Result,
    value::{AgentOutput, PatientRecord, ReportType, RetrievalResult, Stage, fields, slots},
};

/// Tag attached to knowledge that applies to every stage.
pub const GENERAL_TAG: &str = "general";

/// Stage- and report-type-aware retrieval on top of a [`KnowledgeBase`].
#[derive(Clone, Debug)]
pub struct Retriever {
    knowledge: Arc<KnowledgeBase>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(knowledge: Arc<KnowledgeBase>, config: RetrievalConfig) -> Self {
        Self { knowledge, config }
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub async fn retrieve(
        &self,
        stage: Stage,
        patient: &PatientRecord,
        report_type: ReportType,
        upstream: &[AgentOutput],
    ) -> Result<RetrievalResult> {
        let query = build_query(stage, patient, report_type, upstream);
        if query.is_empty() {
            log::debug!("{}: nothing to query", stage);
            return Ok(RetrievalResult::empty());
        }
        let tags = tags_filter(stage, report_type, patient);
        let result = self
            .knowledge
            .query(&query, &tags, self.config.top_k)
            .await?
            .above(self.config.min_similarity);
        log::debug!(
            "{}: {} chunks for tags {:?} (query {:?})",
            stage,
            result.len(),
            tags,
            query
        );
        Ok(result)
    }
}

fn upstream_field<'a>(upstream: &'a [AgentOutput], stage: Stage, key: &str) -> Option<&'a str> {
    upstream
        .iter()
        .find(|o| o.stage == stage)
        .and_then(|o| o.field(key))
}

/// Deterministic query text for a stage; empty when nothing is known.
pub fn build_query(
    stage: Stage,
    patient: &PatientRecord,
    report_type: ReportType,
    upstream: &[AgentOutput],
) -> String {
    let complaint = patient.text(fields::CHIEF_COMPLAINT);
    let diagnosis = upstream_field(upstream, Stage::DiagnosisAdvisor, slots::DIAGNOSIS);
    let parts: Vec<Option<String>> = match stage {
        Stage::SymptomAnalyzer => {
            let vitals = patient.vitals();
            vec![
                complaint,
                (!vitals.is_empty()).then(|| vitals.describe()),
                patient.text(fields::PRESENT_ILLNESS),
            ]
        }
        Stage::DiagnosisAdvisor => vec![
            complaint,
            upstream_field(upstream, Stage::SymptomAnalyzer, slots::FINDINGS).map(str::to_owned),
            upstream_field(upstream, Stage::SymptomAnalyzer, slots::FLAGS).map(str::to_owned),
            patient.text(fields::PAST_HISTORY),
        ],
        Stage::TreatmentRecommender => match diagnosis {
            Some(diagnosis) => vec![Some(diagnosis.to_owned())],
            None => vec![complaint],
        },
        Stage::ReportComposer => vec![
            Some(report_type.title().to_owned()),
            diagnosis.map(str::to_owned),
            complaint,
            patient.text(fields::OPERATION_NAME),
        ],
    };
    let parts = parts.into_iter().flatten().collect::<Vec<_>>();
    // A bare report title says nothing about the patient.
    if stage == Stage::ReportComposer && parts.len() == 1 {
        return String::new();
    }
    parts.join("\n")
}

fn static_tags(stage: Stage, report_type: ReportType) -> &'static [&'static str] {
    match (stage, report_type) {
        (Stage::SymptomAnalyzer, _) => &["symptoms", "triage"],
        (Stage::DiagnosisAdvisor, ReportType::OperativeNote) => &["diagnosis", "surgery"],
        (Stage::DiagnosisAdvisor, _) => &["diagnosis"],
        (Stage::TreatmentRecommender, ReportType::OperativeNote) => {
            &["treatment", "postoperative"]
        }
        (Stage::TreatmentRecommender, _) => &["treatment", "medication"],
        (Stage::ReportComposer, ReportType::AdmissionRecord) => &["admission", "documentation"],
        (Stage::ReportComposer, ReportType::OperativeNote) => &["surgery", "documentation"],
        (Stage::ReportComposer, ReportType::PreliminaryDiagnosis) => &["documentation"],
    }
}

/// Stage tags plus tags implied by the patient's vitals, plus [`GENERAL_TAG`].
pub fn tags_filter(stage: Stage, report_type: ReportType, patient: &PatientRecord) -> BTreeSet<String> {
    let mut tags = static_tags(stage, report_type)
        .iter()
        .map(|t| (*t).to_owned())
        .collect::<BTreeSet<_>>();
    tags.insert(GENERAL_TAG.to_owned());
    tags.extend(clinical_tags(&patient.vitals()));
    tags
}
