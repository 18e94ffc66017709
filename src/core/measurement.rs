// PftLens - core/measurement.rs
//
// MeasurementSet construction and validation.
// A set is built once per interpretation and never mutated: fields are
// private and only read accessors are exposed. Re-analysis builds a new set.

use crate::core::input::{RawEntry, RawInput, RawValue};
use crate::core::model::{Field, Measurement, Parameter, Ratio};
use crate::util::constants;
use crate::util::error::MeasurementError;
use serde::Serialize;

/// Validated measurements. Any parameter may be absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MeasurementSet {
    fev1: Option<Measurement>,
    fvc: Option<Measurement>,
    ratio: Option<Ratio>,
    tlc: Option<Measurement>,
    rv: Option<Measurement>,
    dlco: Option<Measurement>,
}

/// Output of lenient construction: the valid subset plus what was rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct Screened {
    pub set: MeasurementSet,
    pub rejected: Vec<MeasurementError>,
}

impl Screened {
    /// Parameters disqualified by validation, in parameter order.
    pub fn rejected_parameters(&self) -> Vec<Parameter> {
        let mut params: Vec<Parameter> = self.rejected.iter().map(|e| e.parameter()).collect();
        params.sort();
        params.dedup();
        params
    }
}

impl MeasurementSet {
    /// Strict construction: fails on the first invalid value, in parameter
    /// order.
    pub fn from_input(input: &RawInput) -> Result<Self, MeasurementError> {
        let screened = Self::screen(input);
        match screened.rejected.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(screened.set),
        }
    }

    /// Lenient construction: invalid parameters are dropped and reported so
    /// only the axes that need them are affected.
    pub fn screen(input: &RawInput) -> Screened {
        let mut set = MeasurementSet::default();
        let mut rejected = Vec::new();

        for &parameter in Parameter::all() {
            // The ratio has no slot; it is resolved below.
            let Some(slot) = set.slot_mut(parameter) else {
                continue;
            };
            let Some(entry) = input.get(parameter) else {
                continue;
            };
            match validate_entry(parameter, entry) {
                Ok(measurement) => *slot = measurement,
                Err(e) => {
                    tracing::warn!(parameter = %parameter, error = %e, "Rejected measurement");
                    rejected.push(e);
                }
            }
        }

        match reported_ratio(input) {
            Ok(Some(ratio)) => set.ratio = Some(ratio),
            Ok(None) => match set.derive_ratio() {
                Ok(ratio) => set.ratio = ratio,
                Err(e) => {
                    tracing::warn!(error = %e, "Rejected derived FEV1/FVC ratio");
                    rejected.push(e);
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Rejected FEV1/FVC ratio");
                rejected.push(e);
            }
        }

        tracing::debug!(
            present = set.present().len(),
            rejected = rejected.len(),
            "Measurement set screened"
        );

        Screened { set, rejected }
    }

    /// The measurement for a non-ratio parameter.
    pub fn measurement(&self, parameter: Parameter) -> Option<&Measurement> {
        match parameter {
            Parameter::Fev1 => self.fev1.as_ref(),
            Parameter::Fvc => self.fvc.as_ref(),
            Parameter::Tlc => self.tlc.as_ref(),
            Parameter::Rv => self.rv.as_ref(),
            Parameter::Dlco => self.dlco.as_ref(),
            Parameter::Fev1FvcRatio => None,
        }
    }

    /// % predicted of a parameter, if reported.
    pub fn percent_predicted(&self, parameter: Parameter) -> Option<f64> {
        self.measurement(parameter).and_then(|m| m.percent_predicted)
    }

    /// FEV1/FVC ratio, reported or derived.
    pub fn ratio(&self) -> Option<Ratio> {
        self.ratio
    }

    /// Parameters carrying at least one number, in canonical order.
    pub fn present(&self) -> Vec<Parameter> {
        Parameter::all()
            .iter()
            .copied()
            .filter(|&p| match p {
                Parameter::Fev1FvcRatio => self.ratio.is_some(),
                other => self.measurement(other).is_some(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.present().is_empty()
    }

    fn slot_mut(&mut self, parameter: Parameter) -> Option<&mut Option<Measurement>> {
        match parameter {
            Parameter::Fev1 => Some(&mut self.fev1),
            Parameter::Fvc => Some(&mut self.fvc),
            Parameter::Tlc => Some(&mut self.tlc),
            Parameter::Rv => Some(&mut self.rv),
            Parameter::Dlco => Some(&mut self.dlco),
            Parameter::Fev1FvcRatio => None,
        }
    }

    /// FEV1 / FVC x 100 from absolute values, when both are present and FVC > 0.
    fn derive_ratio(&self) -> Result<Option<Ratio>, MeasurementError> {
        let fev1 = self.fev1.and_then(|m| m.value);
        let fvc = self.fvc.and_then(|m| m.value);
        let (Some(fev1), Some(fvc)) = (fev1, fvc) else {
            return Ok(None);
        };
        if fvc <= 0.0 {
            return Ok(None);
        }
        let ratio = fev1 / fvc * 100.0;
        if ratio > constants::MAX_RATIO_PERCENT {
            return Err(MeasurementError::DerivedRatioOutOfRange { fev1, fvc, ratio });
        }
        tracing::debug!(ratio, "Derived FEV1/FVC ratio from absolute values");
        Ok(Some(Ratio {
            percent: ratio,
            derived: true,
        }))
    }
}

fn validate_entry(
    parameter: Parameter,
    entry: &RawEntry,
) -> Result<Option<Measurement>, MeasurementError> {
    let value = entry
        .value
        .as_ref()
        .map(|raw| parse_number(raw, parameter, Field::Value))
        .transpose()?;
    let percent_predicted = entry
        .percent_predicted
        .as_ref()
        .map(|raw| parse_number(raw, parameter, Field::PercentPredicted))
        .transpose()?;

    if value.is_none() && percent_predicted.is_none() {
        return Ok(None);
    }
    Ok(Some(Measurement {
        value,
        percent_predicted,
    }))
}

/// The ratio as reported. The ratio is itself a percentage, so a number
/// supplied under the % predicted field is read as the ratio when no plain
/// value is given.
fn reported_ratio(input: &RawInput) -> Result<Option<Ratio>, MeasurementError> {
    let Some(entry) = input.get(Parameter::Fev1FvcRatio) else {
        return Ok(None);
    };
    let (raw, field) = match (&entry.value, &entry.percent_predicted) {
        (Some(raw), _) => (raw, Field::Value),
        (None, Some(raw)) => (raw, Field::PercentPredicted),
        (None, None) => return Ok(None),
    };
    let percent = parse_number(raw, Parameter::Fev1FvcRatio, field)?;
    if percent > constants::MAX_RATIO_PERCENT {
        return Err(MeasurementError::RatioOutOfRange { value: percent });
    }
    Ok(Some(Ratio {
        percent,
        derived: false,
    }))
}

/// Parse a raw number: JSON numbers pass through; text is trimmed and may
/// carry a trailing `%`. Non-finite and negative values are rejected.
fn parse_number(
    raw: &RawValue,
    parameter: Parameter,
    field: Field,
) -> Result<f64, MeasurementError> {
    let number = match raw {
        RawValue::Number(n) => *n,
        RawValue::Text(text) => {
            let trimmed = text.trim();
            let digits = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
            digits
                .parse::<f64>()
                .map_err(|_| MeasurementError::NotANumber {
                    parameter,
                    field,
                    raw: text.clone(),
                })?
        }
    };
    if !number.is_finite() {
        return Err(MeasurementError::NonFinite { parameter, field });
    }
    if number < 0.0 {
        return Err(MeasurementError::Negative {
            parameter,
            field,
            value: number,
        });
    }
    Ok(number)
}
