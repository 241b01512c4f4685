use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::value::Vitals;

/// Blood-pressure category; the worse of the systolic and diastolic readings wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BpGrade {
    Normal,
    Elevated,
    Stage1,
    Stage2,
    Crisis,
}

impl BpGrade {
    pub fn classify(systolic: f64, diastolic: f64) -> Self {
        let by_systolic = match systolic {
            s if s >= 180.0 => BpGrade::Crisis,
            s if s >= 160.0 => BpGrade::Stage2,
            s if s >= 140.0 => BpGrade::Stage1,
            s if s >= 120.0 => BpGrade::Elevated,
            _ => BpGrade::Normal,
        };
        let by_diastolic = match diastolic {
            d if d >= 110.0 => BpGrade::Crisis,
            d if d >= 100.0 => BpGrade::Stage2,
            d if d >= 90.0 => BpGrade::Stage1,
            d if d >= 80.0 => BpGrade::Elevated,
            _ => BpGrade::Normal,
        };
        by_systolic.max(by_diastolic)
    }

    pub fn of(vitals: &Vitals) -> Option<Self> {
        Some(Self::classify(vitals.systolic?, vitals.diastolic?))
    }

    pub fn is_hypertensive(&self) -> bool {
        *self >= BpGrade::Stage1
    }

    pub fn describe(&self) -> &'static str {
        match self {
            BpGrade::Normal => "normal blood pressure",
            BpGrade::Elevated => "elevated blood pressure",
            BpGrade::Stage1 => "stage 1 hypertension (140-159/90-99 mmHg)",
            BpGrade::Stage2 => "stage 2 hypertension (160-179/100-109 mmHg)",
            BpGrade::Crisis => "hypertensive crisis (>=180/>=110 mmHg)",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VitalAlert {
    Tachycardia,
    Bradycardia,
    Fever,
    Hypothermia,
    Tachypnea,
    Hypoxemia,
}

impl VitalAlert {
    pub fn describe(&self) -> &'static str {
        match self {
            VitalAlert::Tachycardia => "heart rate above 100 bpm",
            VitalAlert::Bradycardia => "heart rate below 50 bpm",
            VitalAlert::Fever => "temperature of 38 °C or more",
            VitalAlert::Hypothermia => "temperature below 35 °C",
            VitalAlert::Tachypnea => "respiratory rate above 24 /min",
            VitalAlert::Hypoxemia => "SpO2 below 94%",
        }
    }
}

pub fn vital_alerts(vitals: &Vitals) -> Vec<VitalAlert> {
    let mut alerts = Vec::new();
    if let Some(hr) = vitals.heart_rate {
        if hr > 100.0 {
            alerts.push(VitalAlert::Tachycardia);
        } else if hr < 50.0 {
            alerts.push(VitalAlert::Bradycardia);
        }
    }
    if let Some(t) = vitals.temperature {
        if t >= 38.0 {
            alerts.push(VitalAlert::Fever);
        } else if t < 35.0 {
            alerts.push(VitalAlert::Hypothermia);
        }
    }
    if let Some(rr) = vitals.respiratory_rate
        && rr > 24.0
    {
        alerts.push(VitalAlert::Tachypnea);
    }
    if let Some(spo2) = vitals.spo2
        && spo2 < 94.0
    {
        alerts.push(VitalAlert::Hypoxemia);
    }
    alerts
}

/// Knowledge tags implied by the patient's vitals.
pub fn clinical_tags(vitals: &Vitals) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    if BpGrade::of(vitals).is_some_and(|g| g.is_hypertensive()) {
        tags.insert("hypertension".to_owned());
        tags.insert("cardiology".to_owned());
    }
    for alert in vital_alerts(vitals) {
        let tag = match alert {
            VitalAlert::Tachycardia | VitalAlert::Bradycardia => "cardiology",
            VitalAlert::Fever | VitalAlert::Hypothermia => "infection",
            VitalAlert::Tachypnea | VitalAlert::Hypoxemia => "respiratory",
        };
        tags.insert(tag.to_owned());
    }
    tags
}

/// One line per finding, used as prompt hints.
pub fn clinical_hints(vitals: &Vitals) -> Vec<String> {
    let mut hints = Vec::new();
    if let Some(grade) = BpGrade::of(vitals)
        && grade != BpGrade::Normal
    {
        hints.push(grade.describe().to_owned());
    }
    hints.extend(vital_alerts(vitals).iter().map(|a| a.describe().to_owned()));
    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        normal = { 115.0, 75.0, BpGrade::Normal },
        elevated = { 125.0, 70.0, BpGrade::Elevated },
        stage1_by_diastolic = { 130.0, 92.0, BpGrade::Stage1 },
        stage2 = { 160.0, 100.0, BpGrade::Stage2 },
        crisis = { 185.0, 95.0, BpGrade::Crisis },
    )]
    fn grades_blood_pressure(systolic: f64, diastolic: f64, expected: BpGrade) {
        assert_eq!(BpGrade::classify(systolic, diastolic), expected);
    }

    #[test]
    fn hypertension_adds_cardiology_tags() {
        let vitals = Vitals {
            systolic: Some(160.0),
            diastolic: Some(100.0),
            ..Default::default()
        };
        let tags = clinical_tags(&vitals);
        assert!(tags.contains("hypertension"));
        assert!(tags.contains("cardiology"));
        assert_eq!(clinical_hints(&vitals).len(), 1);
    }

    #[test]
    fn missing_vitals_yield_nothing() {
        assert!(clinical_tags(&Vitals::default()).is_empty());
        assert_eq!(
            BpGrade::of(&Vitals {
                systolic: Some(200.0),
                ..Default::default()
            }),
            None
        );
    }

    #[test]
    fn alerts_for_fever_and_hypoxemia() {
        let vitals = Vitals {
            temperature: Some(38.6),
            spo2: Some(91.0),
            heart_rate: Some(88.0),
            ..Default::default()
        };
        assert_eq!(
            vital_alerts(&vitals),
            vec![VitalAlert::Fever, VitalAlert::Hypoxemia]
        );
        assert_eq!(
            clinical_tags(&vitals).into_iter().collect::<Vec<_>>(),
            ["infection", "respiratory"]
        );
    }
}
