//! Request body validation.
//!
//! Bodies are checked field by field against the declared feature bounds
//! before anything reaches the predictor. Every violation in a record is
//! reported, each one naming the path of the offending field.

use serde_json::{Map, Value};

use crate::core::{Feature, FeatureRecord, FieldViolation, ValidationError};

/// Hard upper limit on records per batch request.
pub const MAX_BATCH_SIZE: usize = 100;

/// Field name used for violations that concern the whole body.
pub const BODY_FIELD: &str = "body";

/// Inclusive numeric range accepted for a feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn check(&self, value: f64) -> Option<String> {
        if value < self.min {
            Some(format!("must be greater than or equal to {}", self.min))
        } else if value > self.max {
            Some(format!("must be less than or equal to {}", self.max))
        } else {
            None
        }
    }
}

pub const SURFACE_BOUNDS: Bounds = Bounds::new(20.0, 500.0);
pub const ROOMS_BOUNDS: Bounds = Bounds::new(1.0, 15.0);
pub const AGE_BOUNDS: Bounds = Bounds::new(0.0, 100.0);
pub const LOCATION_SCORE_BOUNDS: Bounds = Bounds::new(1.0, 10.0);

/// Decode a raw request body.
pub fn parse_body(bytes: &[u8]) -> Result<Value, ValidationError> {
    serde_json::from_slice(bytes)
        .map_err(|e| ValidationError::single(BODY_FIELD, format!("invalid JSON: {}", e)))
}

/// Validate a single feature record.
pub fn validate_record(value: &Value) -> Result<FeatureRecord, ValidationError> {
    let mut violations = Vec::new();
    match check_record(value, None, &mut violations) {
        Some(record) if violations.is_empty() => Ok(record),
        _ => Err(ValidationError { violations }),
    }
}

/// Validate a batch of records. Any violation rejects the whole batch.
pub fn validate_batch(value: &Value, max_items: usize) -> Result<Vec<FeatureRecord>, ValidationError> {
    let items = value
        .as_array()
        .ok_or_else(|| ValidationError::single(BODY_FIELD, "expected an array of records"))?;

    if items.is_empty() {
        return Err(ValidationError::single(
            BODY_FIELD,
            "batch must contain at least one record",
        ));
    }
    if items.len() > max_items {
        return Err(ValidationError::single(
            BODY_FIELD,
            format!(
                "batch exceeds the maximum of {} records (got {})",
                max_items,
                items.len()
            ),
        ));
    }

    let mut violations = Vec::new();
    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let prefix = format!("[{}]", index);
        if let Some(record) = check_record(item, Some(&prefix), &mut violations) {
            records.push(record);
        }
    }

    if violations.is_empty() {
        Ok(records)
    } else {
        Err(ValidationError { violations })
    }
}

fn field_path(prefix: Option<&str>, feature: Feature) -> String {
    match prefix {
        Some(prefix) => format!("{}.{}", prefix, feature.name()),
        None => feature.name().to_string(),
    }
}

fn check_record(
    value: &Value,
    prefix: Option<&str>,
    violations: &mut Vec<FieldViolation>,
) -> Option<FeatureRecord> {
    let Some(object) = value.as_object() else {
        violations.push(FieldViolation::new(
            prefix.unwrap_or(BODY_FIELD),
            "expected an object",
        ));
        return None;
    };

    let surface = number_field(object, Feature::Surface, SURFACE_BOUNDS, prefix, violations);
    let rooms = rooms_field(object, prefix, violations);
    let age = number_field(object, Feature::Age, AGE_BOUNDS, prefix, violations);
    let location_score = number_field(
        object,
        Feature::LocationScore,
        LOCATION_SCORE_BOUNDS,
        prefix,
        violations,
    );
    let garage = garage_field(object, prefix, violations);

    Some(FeatureRecord {
        surface: surface?,
        rooms: rooms?,
        age: age?,
        location_score: location_score?,
        garage: garage?,
    })
}

fn present<'a>(
    object: &'a Map<String, Value>,
    feature: Feature,
    prefix: Option<&str>,
    violations: &mut Vec<FieldViolation>,
) -> Option<&'a Value> {
    match object.get(feature.name()) {
        None | Some(Value::Null) => {
            violations.push(FieldViolation::new(
                field_path(prefix, feature),
                "field required",
            ));
            None
        }
        Some(value) => Some(value),
    }
}

fn number_field(
    object: &Map<String, Value>,
    feature: Feature,
    bounds: Bounds,
    prefix: Option<&str>,
    violations: &mut Vec<FieldViolation>,
) -> Option<f64> {
    let value = present(object, feature, prefix, violations)?;
    let Some(number) = value.as_f64() else {
        violations.push(FieldViolation::new(
            field_path(prefix, feature),
            "expected a number",
        ));
        return None;
    };

    if let Some(message) = bounds.check(number) {
        violations.push(FieldViolation::new(field_path(prefix, feature), message));
        return None;
    }
    Some(number)
}

fn rooms_field(
    object: &Map<String, Value>,
    prefix: Option<&str>,
    violations: &mut Vec<FieldViolation>,
) -> Option<u32> {
    let value = present(object, Feature::Rooms, prefix, violations)?;

    // 4.0 is accepted as 4, 4.5 is not
    let integer = match value {
        Value::Number(number) => number.as_i64().map(|n| n as f64).or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
        }),
        _ => None,
    };
    let Some(rooms) = integer else {
        violations.push(FieldViolation::new(
            field_path(prefix, Feature::Rooms),
            "expected an integer",
        ));
        return None;
    };

    if let Some(message) = ROOMS_BOUNDS.check(rooms) {
        violations.push(FieldViolation::new(field_path(prefix, Feature::Rooms), message));
        return None;
    }
    Some(rooms as u32)
}

fn garage_field(
    object: &Map<String, Value>,
    prefix: Option<&str>,
    violations: &mut Vec<FieldViolation>,
) -> Option<bool> {
    let value = present(object, Feature::Garage, prefix, violations)?;
    match value.as_bool() {
        Some(garage) => Some(garage),
        None => {
            violations.push(FieldViolation::new(
                field_path(prefix, Feature::Garage),
                "expected a boolean",
            ));
            None
        }
    }
}
