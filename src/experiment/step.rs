//! Step - one declarative unit of work within an experiment

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::{template, Error, Result};

/// Keyword arguments of a step (`where` clause).
pub type Arguments = Map<String, Value>;

const DESC_KEY: &str = "step";
const ACTION_KEY: &str = "do";
const WHERE_KEY: &str = "where";
const EXPECT_KEY: &str = "expect";

/// Step definition as stored on an experiment.
///
/// Serialized form:
///
/// ```json
/// {"step": "Stop app", "do": "cf.stop_app", "where": {"app_name": "{{ app }}"},
///  "expect": [{"operator": "eq", "status": "STOPPED"}]}
/// ```
///
/// `step` (description) and `expect` are optional. The long names
/// `description`, `action`, `arguments` and `expectations` are accepted when
/// reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Step {
    description: Option<String>,
    action: String,
    arguments: Arguments,
    expectations: Vec<Map<String, Value>>,
}

fn field<'a>(map: &'a Map<String, Value>, key: &str, alias: &str) -> Option<&'a Value> {
    map.get(key).or_else(|| map.get(alias))
}

impl Step {
    /// Create a step with an action identifier and its arguments.
    #[must_use]
    pub fn new(action: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            description: None,
            action: action.into(),
            arguments,
            expectations: Vec::new(),
        }
    }

    /// Create a builder for a step with optional description and expectations.
    #[must_use]
    pub fn builder(action: impl Into<String>, arguments: Arguments) -> StepBuilder {
        StepBuilder::new(action, arguments)
    }

    /// Parse one raw step definition.
    ///
    /// Returns `None` when the definition is not valid: `do` must be a
    /// non-empty string and `where` a non-empty mapping.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let action = field(map, ACTION_KEY, "action")?
            .as_str()
            .filter(|action| !action.is_empty())?;
        let arguments = field(map, WHERE_KEY, "arguments")?
            .as_object()
            .filter(|arguments| !arguments.is_empty())?;
        let description = field(map, DESC_KEY, "description")
            .and_then(Value::as_str)
            .filter(|description| !description.is_empty())
            .map(str::to_string);
        let expectations = match field(map, EXPECT_KEY, "expectations") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_object().cloned())
                .collect::<Option<Vec<_>>>()?,
            Some(_) => return None,
        };

        Some(Self {
            description,
            action: action.to_string(),
            arguments: arguments.clone(),
            expectations,
        })
    }

    /// Convert raw definitions into steps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSteps`] listing every invalid definition if
    /// any of them is invalid.
    pub fn convert_to_steps(raw_steps: &[Value]) -> Result<Vec<Self>> {
        let mut steps = Vec::with_capacity(raw_steps.len());
        let mut invalid = Vec::new();
        for raw in raw_steps {
            match Self::from_value(raw) {
                Some(step) => steps.push(step),
                None => invalid.push(raw.clone()),
            }
        }
        if invalid.is_empty() {
            Ok(steps)
        } else {
            Err(Error::InvalidSteps(Value::Array(invalid).to_string()))
        }
    }

    /// Serialize back to the stored mapping form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(description) = &self.description {
            map.insert(DESC_KEY.to_string(), Value::String(description.clone()));
        }
        map.insert(ACTION_KEY.to_string(), Value::String(self.action.clone()));
        map.insert(WHERE_KEY.to_string(), Value::Object(self.arguments.clone()));
        if !self.expectations.is_empty() {
            map.insert(
                EXPECT_KEY.to_string(),
                Value::Array(self.expectations.iter().cloned().map(Value::Object).collect()),
            );
        }
        Value::Object(map)
    }

    /// Get the description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get the dotted action identifier.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Get the arguments (`where` clause).
    #[must_use]
    pub const fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Get the raw expectation specs.
    #[must_use]
    pub fn expectations(&self) -> &[Map<String, Value>] {
        &self.expectations
    }

    /// Namespace segment of the action (text before the first `.`).
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.action.split_once('.').map_or(self.action.as_str(), |(ns, _)| ns)
    }

    /// Function path within the namespace; may itself be dotted.
    #[must_use]
    pub fn function_name(&self) -> &str {
        self.action.split_once('.').map_or("", |(_, name)| name)
    }

    /// Human readable step name: `get_app_by_name` becomes `Get app by name`.
    #[must_use]
    pub fn display_name(&self) -> String {
        let spaced = self.function_name().replace('_', " ");
        let mut chars = spaced.chars();
        chars.next().map_or_else(String::new, |first| {
            first
                .to_uppercase()
                .chain(chars.flat_map(char::to_lowercase))
                .collect()
        })
    }

    /// Root names of template variables referenced by the arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] on malformed placeholder syntax.
    pub fn template_variables(&self) -> Result<BTreeSet<String>> {
        template::referenced_variables(&Value::Object(self.arguments.clone()))
    }

    /// Copy of this step with its arguments rendered against `parameters`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] on malformed placeholder syntax.
    pub fn interpolate(&self, parameters: &Map<String, Value>) -> Result<Self> {
        let rendered = template::render(&Value::Object(self.arguments.clone()), parameters)?;
        let Value::Object(arguments) = rendered else {
            return Err(Error::Template("arguments did not render to a mapping".to_string()));
        };
        Ok(Self {
            arguments,
            ..self.clone()
        })
    }
}

impl TryFrom<Value> for Step {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(&value)
            .ok_or_else(|| Error::InvalidSteps(Value::Array(vec![value]).to_string()))
    }
}

impl From<Step> for Value {
    fn from(step: Step) -> Self {
        step.to_value()
    }
}

/// Builder for `Step`.
#[derive(Debug)]
pub struct StepBuilder {
    step: Step,
}

impl StepBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(action: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            step: Step::new(action, arguments),
        }
    }

    /// Set the human readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.step.description = Some(description.into());
        self
    }

    /// Append an expectation spec.
    #[must_use]
    pub fn expectation(mut self, spec: Map<String, Value>) -> Self {
        self.step.expectations.push(spec);
        self
    }

    /// Build the `Step`.
    #[must_use]
    pub fn build(self) -> Step {
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_step() -> Value {
        json!({
            "step": "description",
            "do": "cf.get_org_by_name",
            "where": {"cf_api_url": "https://cf.test"},
            "expect": [{"operator": "eq", "value": "TEST_ORG"}]
        })
    }

    #[test]
    fn test_from_value() {
        let step = Step::from_value(&full_step()).unwrap();
        assert_eq!(step.description(), Some("description"));
        assert_eq!(step.action(), "cf.get_org_by_name");
        assert_eq!(step.arguments()["cf_api_url"], "https://cf.test");
        assert_eq!(step.expectations().len(), 1);
    }

    #[test]
    fn test_from_value_accepts_long_names() {
        let step = Step::from_value(&json!({
            "description": "d",
            "action": "cm.wait",
            "arguments": {"time_in_seconds": 1},
            "expectations": []
        }))
        .unwrap();
        assert_eq!(step.action(), "cm.wait");
        assert_eq!(step.description(), Some("d"));
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(Step::from_value(&json!({"where": {"a": 1}})).is_none());
        assert!(Step::from_value(&json!({"do": "cm.x"})).is_none());
        assert!(Step::from_value(&json!({"do": "", "where": {"a": 1}})).is_none());
        assert!(Step::from_value(&json!({"do": "cm.x", "where": {}})).is_none());
        assert!(Step::from_value(&json!({"do": "cm.x", "where": "no"})).is_none());
        assert!(Step::from_value(&json!("cm.x")).is_none());
    }

    #[test]
    fn test_convert_to_steps_lists_every_invalid_definition() {
        let raw = vec![
            json!({"do": "cm.wait", "where": {"time_in_seconds": 1}}),
            json!({"do": "cm.x", "where": {}}),
            json!({"where": {"a": 1}}),
        ];
        let err = Step::convert_to_steps(&raw).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Invalid Steps: Some steps provided are invalid. Invalid Steps: [{"do":"cm.x","where":{}},{"where":{"a":1}}]"#
        );

        let steps = Step::convert_to_steps(&raw[..1]).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].action(), "cm.wait");
    }

    #[test]
    fn test_namespace_and_function_name() {
        let step = Step::new("k8s.crd.create", Map::new());
        assert_eq!(step.namespace(), "k8s");
        assert_eq!(step.function_name(), "crd.create");

        let bare = Step::new("cm", Map::new());
        assert_eq!(bare.namespace(), "cm");
        assert_eq!(bare.function_name(), "");
    }

    #[test]
    fn test_display_name() {
        let step = Step::new("cf.get_app_by_name", Map::new());
        assert_eq!(step.display_name(), "Get app by name");
        assert_eq!(Step::new("cf.Stop_App", Map::new()).display_name(), "Stop app");
    }

    #[test]
    fn test_to_value_omits_absent_description() {
        let raw = json!({"do": "test", "where": {"a": "b"}});
        let step = Step::from_value(&raw).unwrap();
        assert_eq!(step.to_value(), raw);
    }

    #[test]
    fn test_serde_uses_stored_keys() {
        let step: Step = serde_json::from_value(full_step()).unwrap();
        assert_eq!(serde_json::to_value(&step).unwrap(), full_step());
        assert!(serde_json::from_value::<Step>(json!({"do": "x"})).is_err());
    }

    #[test]
    fn test_interpolate_renders_where_clause_only() {
        let step = Step::builder("cm.http_probe", json!({"url": "{{ endpoint }}"}).as_object().cloned().unwrap())
            .description("{{ endpoint }}")
            .build();
        let params = json!({"endpoint": "http://myapp.test/health"});
        let rendered = step.interpolate(params.as_object().unwrap()).unwrap();
        assert_eq!(rendered.arguments()["url"], "http://myapp.test/health");
        assert_eq!(rendered.description(), Some("{{ endpoint }}"));
        assert_eq!(step.arguments()["url"], "{{ endpoint }}");
    }
}
