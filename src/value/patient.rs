use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known patient field names.
pub mod fields {
    pub const PATIENT_ID: &str = "patient_id";
    pub const NAME: &str = "name";
    pub const AGE: &str = "age";
    pub const SEX: &str = "sex";
    pub const DEPARTMENT: &str = "department";
    pub const CHIEF_COMPLAINT: &str = "chief_complaint";
    pub const PRESENT_ILLNESS: &str = "present_illness";
    pub const PAST_HISTORY: &str = "past_history";
    pub const PHYSICAL_EXAM: &str = "physical_exam";
    pub const AUXILIARY_EXAM: &str = "auxiliary_exam";
    pub const ADMISSION_TIME: &str = "admission_time";
    pub const OPERATION_NAME: &str = "operation_name";
    pub const OPERATION_DATE: &str = "operation_date";
    pub const SURGEON: &str = "surgeon";
    pub const ANESTHESIA: &str = "anesthesia";

    pub const SYSTOLIC: &str = "systolic";
    pub const DIASTOLIC: &str = "diastolic";
    pub const HEART_RATE: &str = "heart_rate";
    pub const TEMPERATURE: &str = "temperature";
    pub const RESPIRATORY_RATE: &str = "respiratory_rate";
    pub const SPO2: &str = "spo2";

    pub const VITAL_FIELDS: [&str; 6] = [
        SYSTOLIC,
        DIASTOLIC,
        HEART_RATE,
        TEMPERATURE,
        RESPIRATORY_RATE,
        SPO2,
    ];
}

/// Structured patient information submitted with a report request.
///
/// Field order is preserved so that prompts and reports built from the record
/// are reproducible.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientRecord {
    fields: IndexMap<String, Value>,
}

impl PatientRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.text(key).is_some()
    }

    /// Returns the field as trimmed text. Numbers and booleans are rendered;
    /// empty strings, nulls, arrays and objects count as absent.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_owned())
            }
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Returns the field as a number, accepting numeric strings.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.fields.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn vitals(&self) -> Vitals {
        Vitals {
            systolic: self.number(fields::SYSTOLIC),
            diastolic: self.number(fields::DIASTOLIC),
            heart_rate: self.number(fields::HEART_RATE),
            temperature: self.number(fields::TEMPERATURE),
            respiratory_rate: self.number(fields::RESPIRATORY_RATE),
            spo2: self.number(fields::SPO2),
        }
    }

    /// `key: value` lines for every textual field except vitals, in insertion order.
    pub fn summary(&self) -> String {
        self.fields
            .keys()
            .filter(|k| !fields::VITAL_FIELDS.contains(&k.as_str()))
            .filter_map(|k| self.text(k).map(|v| format!("{}: {}", k, v)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl FromIterator<(String, Value)> for PatientRecord {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    pub heart_rate: Option<f64>,
    pub temperature: Option<f64>,
    pub respiratory_rate: Option<f64>,
    pub spo2: Option<f64>,
}

impl Vitals {
    pub fn is_empty(&self) -> bool {
        *self == Vitals::default()
    }

    /// Compact human-readable rendering, e.g. `BP 160/100 mmHg, HR 88 bpm`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        match (self.systolic, self.diastolic) {
            (Some(s), Some(d)) => parts.push(format!("BP {}/{} mmHg", fmt_num(s), fmt_num(d))),
            (Some(s), None) => parts.push(format!("SBP {} mmHg", fmt_num(s))),
            (None, Some(d)) => parts.push(format!("DBP {} mmHg", fmt_num(d))),
            (None, None) => {}
        }
        if let Some(v) = self.heart_rate {
            parts.push(format!("HR {} bpm", fmt_num(v)));
        }
        if let Some(v) = self.respiratory_rate {
            parts.push(format!("RR {} /min", fmt_num(v)));
        }
        if let Some(v) = self.temperature {
            parts.push(format!("T {} °C", fmt_num(v)));
        }
        if let Some(v) = self.spo2 {
            parts.push(format!("SpO2 {}%", fmt_num(v)));
        }
        parts.join(", ")
    }
}

fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e9 {
        format!("{}", v as i64)
    } else {
        format!("{:.1}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PatientRecord {
        PatientRecord::new()
            .with_field(fields::CHIEF_COMPLAINT, "  chest pain ")
            .with_field(fields::SYSTOLIC, 160)
            .with_field(fields::DIASTOLIC, "100")
            .with_field(fields::TEMPERATURE, 37.4)
            .with_field(fields::PAST_HISTORY, "")
    }

    #[test]
    fn text_trims_and_skips_empty() {
        let r = record();
        assert_eq!(r.text(fields::CHIEF_COMPLAINT).as_deref(), Some("chest pain"));
        assert_eq!(r.text(fields::SYSTOLIC).as_deref(), Some("160"));
        assert_eq!(r.text(fields::PAST_HISTORY), None);
        assert!(!r.contains(fields::PAST_HISTORY));
    }

    #[test]
    fn numbers_accept_numeric_strings() {
        let v = record().vitals();
        assert_eq!(v.systolic, Some(160.0));
        assert_eq!(v.diastolic, Some(100.0));
        assert_eq!(v.heart_rate, None);
        assert_eq!(v.describe(), "BP 160/100 mmHg, T 37.4 °C");
    }

    #[test]
    fn summary_excludes_vitals_and_keeps_order() {
        let r = record().with_field(fields::AGE, 58);
        assert_eq!(r.summary(), "chief_complaint: chest pain\nage: 58");
    }

    #[test]
    fn deserializes_from_flat_object() {
        let r: PatientRecord =
            serde_json::from_str(r#"{"chief_complaint": "cough", "heart_rate": 92}"#).unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.vitals().heart_rate, Some(92.0));
    }
}
