use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    agent::PromptBuilder,
    boxed,
    config::{GenerationConfig, KnowledgeBaseConfig, OrchestratorConfig, RetrievalConfig},
    knowledge::{KnowledgeBase, Retriever},
    model::{EmbeddingModel, GenerationRequest, LangModel},
    value::{PatientRecord, ReportType, SourceDocument, Stage, fields},
    workflow::Orchestrator,
};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Which agent a rendered prompt was built for, read from its opening line.
pub(crate) fn stage_of_prompt(prompt: &str) -> Option<Stage> {
    let first = prompt.lines().next()?;
    if first.starts_with("You are a clinical symptom analyst") {
        Some(Stage::SymptomAnalyzer)
    } else if first.starts_with("You are a diagnostic advisor") {
        Some(Stage::DiagnosisAdvisor)
    } else if first.starts_with("You are a treatment advisor") {
        Some(Stage::TreatmentRecommender)
    } else if first.starts_with("You are a medical scribe") {
        Some(Stage::ReportComposer)
    } else {
        None
    }
}

fn report_type_of_prompt(prompt: &str) -> ReportType {
    let first = prompt.lines().next().unwrap_or_default();
    if first.contains(ReportType::OperativeNote.title()) {
        ReportType::OperativeNote
    } else if first.contains(ReportType::AdmissionRecord.title()) {
        ReportType::AdmissionRecord
    } else {
        ReportType::PreliminaryDiagnosis
    }
}

/// A well-formed reply covering every field of the stage.
pub(crate) fn complete_reply(stage: Stage, report_type: ReportType) -> String {
    let body = match (stage, report_type) {
        (Stage::SymptomAnalyzer, _) => {
            "Findings: acute substernal chest pain with markedly elevated blood pressure\n\
             Risk Level: high\n\
             Flags: possible hypertensive crisis"
        }
        (Stage::DiagnosisAdvisor, _) => {
            "Diagnosis: Stage 2 Hypertension, rule out crisis\n\
             Differential: acute coronary syndrome; aortic dissection\n\
             Rationale: BP 160/100 mmHg with chest pain"
        }
        (Stage::TreatmentRecommender, _) => {
            "Plan: start antihypertensive therapy and obtain ECG and troponin\n\
             Medications: amlodipine 5 mg daily\n\
             Follow Up: recheck blood pressure in 1 week\n\
             Precautions: return immediately for worsening chest pain"
        }
        (Stage::ReportComposer, ReportType::OperativeNote) => {
            "Preoperative Diagnosis: acute appendicitis\n\
             Operation Process: laparoscopic appendectomy under general anesthesia\n\
             Operation Result: inflamed appendix removed without complication\n\
             Postoperative Diagnosis: acute suppurative appendicitis"
        }
        (Stage::ReportComposer, ReportType::AdmissionRecord) => {
            "Present Illness: chest pain for two hours radiating to the left arm\n\
             Physical Exam: alert, BP 160/100 mmHg, lungs clear\n\
             Auxiliary Exam: ECG pending\n\
             Summary: admitted for hypertensive chest pain"
        }
        (Stage::ReportComposer, ReportType::PreliminaryDiagnosis) => {
            "Summary: outpatient assessment completed"
        }
    };
    format!("{}\nConfidence: 0.9", body)
}

#[derive(Default)]
struct Script {
    queued: HashMap<Stage, VecDeque<anyhow::Result<String>>>,
    calls: Vec<Stage>,
    prompts: Vec<(Stage, String)>,
}

/// Generation backend answering per stage: queued replies first, then a
/// complete reply for the stage.
#[derive(Clone, Default)]
pub(crate) struct ScriptedLangModel {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLangModel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(self, stage: Stage, text: impl Into<String>) -> Self {
        self.script
            .lock()
            .queued
            .entry(stage)
            .or_default()
            .push_back(Ok(text.into()));
        self
    }

    pub(crate) fn fail(self, stage: Stage, reason: &str) -> Self {
        self.script
            .lock()
            .queued
            .entry(stage)
            .or_default()
            .push_back(Err(anyhow::anyhow!("{}", reason)));
        self
    }

    /// Stages in the order they were asked to generate.
    pub(crate) fn calls(&self) -> Vec<Stage> {
        self.script.lock().calls.clone()
    }

    /// The first prompt rendered for `stage`.
    pub(crate) fn prompt(&self, stage: Stage) -> Option<String> {
        self.script
            .lock()
            .prompts
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, p)| p.clone())
    }

    pub(crate) fn model(&self) -> LangModel {
        let script = self.script.clone();
        LangModel::new_custom(Arc::new(move |req: GenerationRequest| {
            let script = script.clone();
            boxed!(async move {
                let Some(stage) = stage_of_prompt(&req.prompt) else {
                    return Err(anyhow::anyhow!("unrecognised prompt"));
                };
                let queued = {
                    let mut script = script.lock();
                    script.calls.push(stage);
                    script.prompts.push((stage, req.prompt.clone()));
                    script.queued.get_mut(&stage).and_then(VecDeque::pop_front)
                };
                match queued {
                    Some(reply) => reply,
                    None => Ok(complete_reply(stage, report_type_of_prompt(&req.prompt))),
                }
            })
        }))
    }
}

pub(crate) const HYPERTENSION_GUIDELINE: &str = "Stage 2 hypertension is a blood pressure of 160/100 mmHg or more. \
Patients with chest pain and stage 2 hypertension need an ECG and troponin to exclude acute coronary syndrome. \
Start antihypertensive therapy with a calcium channel blocker such as amlodipine.";

/// Fast retries and short timeouts for index access.
pub(crate) fn fast_knowledge_config() -> KnowledgeBaseConfig {
    KnowledgeBaseConfig {
        index_timeout_ms: 500,
        index_retries: 1,
        backoff_base_ms: 1,
        backoff_max_ms: 2,
        ..Default::default()
    }
}

pub(crate) fn fast_orchestrator_config() -> OrchestratorConfig {
    OrchestratorConfig {
        generation_timeout_ms: 1_000,
        backoff_base_ms: 1,
        backoff_max_ms: 2,
        ..Default::default()
    }
}

pub(crate) async fn hypertension_knowledge() -> Arc<KnowledgeBase> {
    let kb = KnowledgeBase::new(fast_knowledge_config(), EmbeddingModel::new_hashing(256));
    kb.ingest(
        SourceDocument::new("guideline/hypertension", HYPERTENSION_GUIDELINE)
            .with_tags(["hypertension", "cardiology"]),
    )
    .await
    .expect("ingest succeeds");
    Arc::new(kb)
}

pub(crate) fn orchestrator(kb: Arc<KnowledgeBase>, lm: LangModel, config: OrchestratorConfig) -> Orchestrator {
    Orchestrator::new(
        Retriever::new(kb, RetrievalConfig::default()),
        lm,
        Arc::new(PromptBuilder::new().expect("prompt templates compile")),
        GenerationConfig::default(),
        config,
    )
}

/// Adult with chest pain and stage 2 blood pressure.
pub(crate) fn chest_pain_patient() -> PatientRecord {
    PatientRecord::new()
        .with_field(fields::AGE, 58)
        .with_field(fields::SEX, "female")
        .with_field(fields::CHIEF_COMPLAINT, "chest pain radiating to the left arm for two hours")
        .with_field(fields::SYSTOLIC, 160)
        .with_field(fields::DIASTOLIC, 100)
        .with_field(fields::HEART_RATE, 92)
}
