// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::color::Rgb;

/// How a parameter is edited and how its raw value is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Color,
    Slider,
    Checkbox,
    Input,
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterKind::Color => write!(f, "color"),
            ParameterKind::Slider => write!(f, "slider"),
            ParameterKind::Checkbox => write!(f, "checkbox"),
            ParameterKind::Input => write!(f, "input"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParameterError {
    #[error("parameter '{name}' ({kind}) cannot take the value {value}")]
    InvalidValue {
        name: String,
        kind: ParameterKind,
        value: String,
    },

    #[error("unknown parameter '{0}'")]
    Unknown(String),

    #[error("parameter '{name}' is a {actual}, not a {expected}")]
    WrongKind {
        name: String,
        expected: ParameterKind,
        actual: ParameterKind,
    },
}

/// Editor hints for sliders. Values outside the range are still accepted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Constraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

/// A decoded parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Color(Rgb),
    Number(f64),
    Bool(bool),
    Text(String),
}

impl ParameterValue {
    pub fn to_json(&self) -> Value {
        match self {
            ParameterValue::Color(color) => Value::String(color.to_hex()),
            ParameterValue::Number(number) => serde_json::json!(number),
            ParameterValue::Bool(flag) => Value::Bool(*flag),
            ParameterValue::Text(text) => Value::String(text.clone()),
        }
    }
}

fn decode(kind: ParameterKind, raw: &Value) -> Option<ParameterValue> {
    match kind {
        ParameterKind::Color => Rgb::from_json(raw).ok().map(ParameterValue::Color),
        ParameterKind::Slider => match raw {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|number| number.is_finite())
        .map(ParameterValue::Number),
        ParameterKind::Checkbox => match raw {
            Value::Bool(flag) => Some(*flag),
            Value::String(text) => match text.trim().to_lowercase().as_str() {
                "true" | "on" | "1" => Some(true),
                "false" | "off" | "0" | "" => Some(false),
                _ => None,
            },
            Value::Number(number) => number.as_f64().map(|n| n != 0.0),
            Value::Null => Some(false),
            _ => None,
        }
        .map(ParameterValue::Bool),
        ParameterKind::Input => Some(ParameterValue::Text(match raw {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })),
    }
}

/// A named, typed, user-adjustable effect input. The raw value is what gets persisted;
/// it is decoded on every read.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    kind: ParameterKind,
    raw: Value,
    constraints: Constraints,
}

impl Parameter {
    pub fn color(name: &str, hex: &str) -> Parameter {
        Parameter {
            name: name.to_string(),
            kind: ParameterKind::Color,
            raw: Value::String(hex.to_string()),
            constraints: Constraints::default(),
        }
    }

    pub fn slider(name: &str, default: f64, min: f64, max: f64, step: f64) -> Parameter {
        Parameter {
            name: name.to_string(),
            kind: ParameterKind::Slider,
            raw: serde_json::json!(default),
            constraints: Constraints {
                min: Some(min),
                max: Some(max),
                step: Some(step),
            },
        }
    }

    pub fn checkbox(name: &str, default: bool) -> Parameter {
        Parameter {
            name: name.to_string(),
            kind: ParameterKind::Checkbox,
            raw: Value::Bool(default),
            constraints: Constraints::default(),
        }
    }

    pub fn input(name: &str, default: &str) -> Parameter {
        Parameter {
            name: name.to_string(),
            kind: ParameterKind::Input,
            raw: Value::String(default.to_string()),
            constraints: Constraints::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Decodes the raw value according to the parameter kind.
    pub fn get(&self) -> Result<ParameterValue, ParameterError> {
        decode(self.kind, &self.raw).ok_or_else(|| self.invalid(&self.raw))
    }

    /// Replaces the raw value. Values that cannot be decoded are rejected and the
    /// previous value is kept.
    pub fn set(&mut self, raw: Value) -> Result<(), ParameterError> {
        if decode(self.kind, &raw).is_none() {
            return Err(self.invalid(&raw));
        }
        self.raw = raw;
        Ok(())
    }

    fn invalid(&self, raw: &Value) -> ParameterError {
        ParameterError::InvalidValue {
            name: self.name.clone(),
            kind: self.kind,
            value: raw.to_string(),
        }
    }

    fn wrong_kind(&self, expected: ParameterKind) -> ParameterError {
        ParameterError::WrongKind {
            name: self.name.clone(),
            expected,
            actual: self.kind,
        }
    }

    /// The editor description of this parameter.
    pub fn describe(&self) -> Value {
        let mut description = serde_json::json!({
            "name": self.name,
            "type": self.kind,
            "value": self.raw,
        });
        if let (Value::Object(map), Ok(Value::Object(constraints))) =
            (&mut description, serde_json::to_value(self.constraints))
        {
            map.extend(constraints);
        }
        description
    }
}

/// The ordered parameter set of an effect instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    list: Vec<Parameter>,
}

impl Parameters {
    pub fn new() -> Parameters {
        Parameters::default()
    }

    /// Adds a parameter, builder style.
    pub fn with(mut self, parameter: Parameter) -> Parameters {
        self.list.push(parameter);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.list.iter().find(|parameter| parameter.name == name)
    }

    fn require(&self, name: &str) -> Result<&Parameter, ParameterError> {
        self.get(name)
            .ok_or_else(|| ParameterError::Unknown(name.to_string()))
    }

    pub fn set(&mut self, name: &str, raw: Value) -> Result<(), ParameterError> {
        self.list
            .iter_mut()
            .find(|parameter| parameter.name == name)
            .ok_or_else(|| ParameterError::Unknown(name.to_string()))?
            .set(raw)
    }

    /// Applies persisted overrides. Unknown or undecodable values are logged and skipped.
    pub fn apply(&mut self, overrides: &BTreeMap<String, Value>) {
        for (name, raw) in overrides {
            if let Err(e) = self.set(name, raw.clone()) {
                warn!(err = %e, parameter = name, "Ignoring stored parameter value");
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn color(&self, name: &str) -> Result<Rgb, ParameterError> {
        let parameter = self.require(name)?;
        match parameter.get()? {
            ParameterValue::Color(color) => Ok(color),
            _ => Err(parameter.wrong_kind(ParameterKind::Color)),
        }
    }

    pub fn number(&self, name: &str) -> Result<f64, ParameterError> {
        let parameter = self.require(name)?;
        match parameter.get()? {
            ParameterValue::Number(number) => Ok(number),
            _ => Err(parameter.wrong_kind(ParameterKind::Slider)),
        }
    }

    pub fn flag(&self, name: &str) -> Result<bool, ParameterError> {
        let parameter = self.require(name)?;
        match parameter.get()? {
            ParameterValue::Bool(flag) => Ok(flag),
            _ => Err(parameter.wrong_kind(ParameterKind::Checkbox)),
        }
    }

    pub fn text(&self, name: &str) -> Result<String, ParameterError> {
        let parameter = self.require(name)?;
        match parameter.get()? {
            ParameterValue::Text(text) => Ok(text),
            _ => Err(parameter.wrong_kind(ParameterKind::Input)),
        }
    }

    /// Decoded values keyed by name. Undecodable values map to null.
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.list
            .iter()
            .map(|parameter| {
                let value = parameter
                    .get()
                    .map(|value| value.to_json())
                    .unwrap_or(Value::Null);
                (parameter.name.clone(), value)
            })
            .collect()
    }

    pub fn describe(&self) -> Vec<Value> {
        self.list.iter().map(Parameter::describe).collect()
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_slider_accepts_numeric_strings() -> Result<(), ParameterError> {
        let mut parameter = Parameter::slider("Speed", 1.0, 0.0, 100.0, 1.0);
        parameter.set(json!("42"))?;
        assert_eq!(ParameterValue::Number(42.0), parameter.get()?);
        assert_eq!(&json!("42"), parameter.raw());

        parameter.set(json!(7.5))?;
        assert_eq!(ParameterValue::Number(7.5), parameter.get()?);
        Ok(())
    }

    #[test]
    fn test_color_round_trip() -> Result<(), ParameterError> {
        let mut parameter = Parameter::color("Color", "#FF0000");
        assert_eq!(ParameterValue::Color(Rgb::RED), parameter.get()?);

        parameter.set(json!("#00ff00"))?;
        assert_eq!(ParameterValue::Color(Rgb::new(0, 255, 0)), parameter.get()?);
        assert_eq!(json!("#00FF00"), parameter.get()?.to_json());
        Ok(())
    }

    #[test]
    fn test_checkbox_decoding() -> Result<(), ParameterError> {
        let mut parameter = Parameter::checkbox("Reverse", false);
        for (raw, expected) in [
            (json!(true), true),
            (json!("true"), true),
            (json!("False"), false),
            (json!(1), true),
            (json!(0), false),
        ] {
            parameter.set(raw)?;
            assert_eq!(ParameterValue::Bool(expected), parameter.get()?);
        }
        Ok(())
    }

    #[test]
    fn test_invalid_value_is_rejected_and_kept() {
        let mut parameter = Parameter::slider("Speed", 3.0, 0.0, 10.0, 1.0);
        assert!(matches!(
            parameter.set(json!("fast")),
            Err(ParameterError::InvalidValue { .. })
        ));
        assert_eq!(Ok(ParameterValue::Number(3.0)), parameter.get());

        let mut color = Parameter::color("Color", "#000000");
        assert!(color.set(json!("red")).is_err());
        assert_eq!(Ok(ParameterValue::Color(Rgb::BLACK)), color.get());
    }

    #[test]
    fn test_input_takes_anything() -> Result<(), ParameterError> {
        let mut parameter = Parameter::input("Label", "hello");
        assert_eq!(ParameterValue::Text("hello".to_string()), parameter.get()?);
        parameter.set(json!(12))?;
        assert_eq!(ParameterValue::Text("12".to_string()), parameter.get()?);
        Ok(())
    }

    #[test]
    fn test_parameters_accessors() -> Result<(), ParameterError> {
        let mut parameters = Parameters::new()
            .with(Parameter::color("Color", "#0000FF"))
            .with(Parameter::slider("Speed", 2.0, 1.0, 10.0, 1.0))
            .with(Parameter::checkbox("Reverse", true));

        assert_eq!(Rgb::new(0, 0, 255), parameters.color("Color")?);
        assert_eq!(2.0, parameters.number("Speed")?);
        assert!(parameters.flag("Reverse")?);
        assert!(matches!(
            parameters.number("Color"),
            Err(ParameterError::WrongKind { .. })
        ));
        assert_eq!(
            Err(ParameterError::Unknown("Missing".to_string())),
            parameters.set("Missing", json!(1))
        );

        let mut overrides = BTreeMap::new();
        overrides.insert("Speed".to_string(), json!("5"));
        overrides.insert("Missing".to_string(), json!(1));
        overrides.insert("Color".to_string(), json!("nope"));
        parameters.apply(&overrides);
        assert_eq!(5.0, parameters.number("Speed")?);
        assert_eq!(Rgb::new(0, 0, 255), parameters.color("Color")?);

        let values = parameters.values();
        assert_eq!(Some(&json!("#0000FF")), values.get("Color"));
        assert_eq!(Some(&json!(5.0)), values.get("Speed"));
        Ok(())
    }

    #[test]
    fn test_describe() {
        let description = Parameter::slider("Speed", 2.0, 1.0, 10.0, 0.5).describe();
        assert_eq!(
            json!({"name": "Speed", "type": "slider", "value": 2.0, "min": 1.0, "max": 10.0, "step": 0.5}),
            description
        );
        assert_eq!(
            json!({"name": "Color", "type": "color", "value": "#FF0000"}),
            Parameter::color("Color", "#FF0000").describe()
        );
    }
}
