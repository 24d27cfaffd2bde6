//! Workflow Context - Per-run variable store
//!
//! Seeded from the caller's inputs. Every executed step's result is recorded
//! both in execution order and as the variable `steps.<stepId>`.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::HashMap;

lazy_static! {
    static ref TEMPLATE: Regex = Regex::new(r"\{\{(.+?)\}\}").expect("template pattern compiles");
}

/// Workflow execution context
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    variables: HashMap<String, Value>,
    step_results: IndexMap<String, Value>,
}

impl WorkflowContext {
    /// Create a context seeded with `inputs`
    pub fn new(inputs: HashMap<String, Value>) -> Self {
        Self {
            variables: inputs,
            step_results: IndexMap::new(),
        }
    }

    /// Get a variable by its exact name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Set a variable
    pub fn set(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    /// Record a step result
    pub fn set_step_result(&mut self, step_id: &str, result: Value) {
        self.variables
            .insert(format!("steps.{}", step_id), result.clone());
        self.step_results.insert(step_id.to_string(), result);
    }

    /// Get a recorded step result
    pub fn step_result(&self, step_id: &str) -> Option<&Value> {
        self.step_results.get(step_id)
    }

    /// Step results in execution order
    pub fn step_results(&self) -> &IndexMap<String, Value> {
        &self.step_results
    }

    /// Consume the context, keeping only the step results
    pub fn into_results(self) -> IndexMap<String, Value> {
        self.step_results
    }

    /// Look up a dotted path.
    ///
    /// The longest dotted prefix that is itself a variable name wins, so
    /// `steps.fetch.body` finds the `body` field of the `steps.fetch` result.
    /// The remaining segments descend into object fields and array indices.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let segments: Vec<&str> = path.split('.').map(str::trim).collect();
        for split in (1..=segments.len()).rev() {
            let key = segments[..split].join(".");
            if let Some(root) = self.variables.get(&key) {
                if let Some(found) = descend(root, &segments[split..]) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Substitute every `{{path}}` in `template`.
    ///
    /// Strings substitute raw, other values as compact JSON, missing values
    /// as the empty string.
    pub fn resolve(&self, template: &str) -> String {
        TEMPLATE
            .replace_all(template, |caps: &Captures| match self.lookup(caps[1].trim()) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            })
            .into_owned()
    }

    /// Resolve templates in string-valued parameters; others pass through
    pub fn resolve_params(&self, params: &Map<String, Value>) -> Map<String, Value> {
        params
            .iter()
            .map(|(key, value)| {
                let resolved = match value {
                    Value::String(s) => Value::String(self.resolve(s)),
                    other => other.clone(),
                };
                (key.clone(), resolved)
            })
            .collect()
    }
}

fn descend<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(*segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(inputs: Value) -> WorkflowContext {
        let map = match inputs {
            Value::Object(map) => map.into_iter().collect(),
            _ => HashMap::new(),
        };
        WorkflowContext::new(map)
    }

    #[test]
    fn test_resolve_nested_paths() {
        let ctx = ctx(json!({
            "user": {"name": "alice", "roles": ["admin", "ops"]},
            "count": 3
        }));

        assert_eq!(ctx.resolve("hi {{ user.name }}"), "hi alice");
        assert_eq!(ctx.resolve("{{user.roles.1}}"), "ops");
        assert_eq!(ctx.resolve("n={{count}}"), "n=3");
        assert_eq!(ctx.resolve("{{user.roles}}"), r#"["admin","ops"]"#);
        assert_eq!(ctx.resolve("[{{missing.path}}]"), "[]");
    }

    #[test]
    fn test_step_results_reachable_from_templates() {
        let mut ctx = ctx(json!({}));
        ctx.set_step_result("fetch", json!({"body": "payload", "status": 200}));
        ctx.set_step_result("parse", json!(true));

        assert_eq!(ctx.resolve("{{steps.fetch.body}}"), "payload");
        assert_eq!(ctx.resolve("{{steps.fetch.status}}"), "200");
        assert_eq!(ctx.get("steps.parse"), Some(&json!(true)));

        let order: Vec<&String> = ctx.step_results().keys().collect();
        assert_eq!(order, vec!["fetch", "parse"]);
    }

    #[test]
    fn test_resolve_params_only_touches_strings() {
        let ctx = ctx(json!({"host": "db01"}));
        let params = json!({"target": "{{host}}", "retries": 2, "flags": ["{{host}}"]});
        let resolved = ctx.resolve_params(params.as_object().unwrap());

        assert_eq!(resolved["target"], "db01");
        assert_eq!(resolved["retries"], 2);
        assert_eq!(resolved["flags"], json!(["{{host}}"]));
    }
}
