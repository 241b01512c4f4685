use std::sync::LazyLock;

use fancy_regex::Regex;
use unicode_segmentation::UnicodeSegmentation as _;

use crate::{
    error::{Error, FieldViolation, Result},
    value::{PatientRecord, ReportType, fields},
};

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("date pattern is valid")
});

/// Plausible ranges for numeric fields.
const RANGES: [(&str, f64, f64); 7] = [
    (fields::AGE, 0.0, 150.0),
    (fields::SYSTOLIC, 50.0, 300.0),
    (fields::DIASTOLIC, 20.0, 200.0),
    (fields::HEART_RATE, 20.0, 250.0),
    (fields::TEMPERATURE, 30.0, 45.0),
    (fields::RESPIRATORY_RATE, 4.0, 80.0),
    (fields::SPO2, 50.0, 100.0),
];

struct Violations(Vec<FieldViolation>);

impl Violations {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldViolation::new(field, message));
    }

    fn required(&mut self, patient: &PatientRecord, field: &str) -> Option<String> {
        let value = patient.text(field);
        if value.is_none() {
            self.push(field, "is required");
        }
        value
    }

    fn required_length(&mut self, patient: &PatientRecord, field: &str, min: usize, max: usize) {
        if let Some(value) = self.required(patient, field) {
            let len = value.graphemes(true).count();
            if len < min || len > max {
                self.push(
                    field,
                    format!("must be {}-{} characters, got {}", min, max, len),
                );
            }
        }
    }
}

/// Checks that `patient` carries what `report_type` needs.
///
/// Every violation is reported at once; nothing else is touched.
pub fn validate(patient: &PatientRecord, report_type: ReportType) -> Result<()> {
    let mut v = Violations(Vec::new());

    match report_type {
        ReportType::PreliminaryDiagnosis => {
            v.required_length(patient, fields::CHIEF_COMPLAINT, 2, 500);
        }
        ReportType::AdmissionRecord => {
            v.required_length(patient, fields::CHIEF_COMPLAINT, 2, 500);
            v.required_length(patient, fields::PRESENT_ILLNESS, 10, 2000);
            v.required(patient, fields::DEPARTMENT);
            v.required(patient, fields::ADMISSION_TIME);
        }
        ReportType::OperativeNote => {
            v.required(patient, fields::OPERATION_NAME);
            if let Some(date) = v.required(patient, fields::OPERATION_DATE)
                && !is_calendar_date(&date)
            {
                v.push(fields::OPERATION_DATE, format!("must be a YYYY-MM-DD date, got {:?}", date));
            }
            v.required(patient, fields::SURGEON);
            v.required(patient, fields::ANESTHESIA);
        }
    }

    for (field, min, max) in RANGES {
        if patient.get(field).is_none_or(|value| value.is_null()) {
            continue;
        }
        match patient.number(field) {
            Some(n) if (min..=max).contains(&n) => {}
            Some(n) => v.push(field, format!("{} is outside {}-{}", n, min, max)),
            None => v.push(field, "must be numeric"),
        }
    }

    if v.0.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(v.0))
    }
}

fn is_calendar_date(s: &str) -> bool {
    let Ok(Some(caps)) = ISO_DATE.captures(s) else {
        return false;
    };
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let (Some(year), Some(month), Some(day)) = (part(1), part(2), part(3)) else {
        return false;
    };
    let days = match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) => 29,
        2 => 28,
        _ => return false,
    };
    (1..=days).contains(&day)
}
