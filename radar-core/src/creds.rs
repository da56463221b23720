//! Credential interpolation for `((var))` placeholders in resource sources.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::LazyLock;

use async_trait::async_trait;
use radar_model::Source;
use regex::Regex;
use serde_json::Value;

use crate::error::{Result, ScanError};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\(([-/.\w]+)\)\)").expect("placeholder pattern is valid")
});

/// Secret lookup backing placeholder evaluation.
#[async_trait]
pub trait Variables: Send + Sync {
    /// `Ok(None)` when the variable is not defined.
    async fn get(&self, name: &str) -> Result<Option<Value>>;
}

/// Fixed in-memory variables, mainly for tests and single-node setups.
#[derive(Clone, Default)]
pub struct StaticVariables {
    values: HashMap<String, Value>,
}

impl fmt::Debug for StaticVariables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.values.keys().collect();
        names.sort();
        f.debug_struct("StaticVariables")
            .field("names", &names)
            .finish()
    }
}

impl StaticVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for StaticVariables {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl Variables for StaticVariables {
    async fn get(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.values.get(name).cloned())
    }
}

/// Replace every placeholder in `source` with its variable value.
///
/// A string that is exactly one placeholder takes the variable's JSON value;
/// placeholders embedded in longer strings are spliced in as text. A
/// `((name.field))` reference indexes into an object-valued variable.
pub async fn evaluate_source(
    variables: &dyn Variables,
    source: &Source,
) -> Result<Source> {
    let mut names = BTreeSet::new();
    for value in source.values() {
        collect_placeholders(value, &mut names);
    }
    if names.is_empty() {
        return Ok(source.clone());
    }

    let mut resolved = HashMap::with_capacity(names.len());
    let mut missing = Vec::new();
    for name in names {
        match lookup(variables, &name).await? {
            Some(value) => {
                resolved.insert(name, value);
            }
            None => missing.push(name),
        }
    }
    if !missing.is_empty() {
        return Err(ScanError::UndefinedVariables { names: missing });
    }

    Ok(source
        .iter()
        .map(|(key, value)| (key.clone(), substitute(value, &resolved)))
        .collect())
}

async fn lookup(variables: &dyn Variables, reference: &str) -> Result<Option<Value>> {
    let mut path = reference.split('.');
    let Some(base) = path.next() else {
        return Ok(None);
    };
    let Some(mut value) = variables.get(base).await? else {
        return Ok(None);
    };
    for field in path {
        match value.get(field) {
            Some(inner) => value = inner.clone(),
            None => return Ok(None),
        }
    }
    Ok(Some(value))
}

fn collect_placeholders(value: &Value, names: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            for captures in PLACEHOLDER.captures_iter(s) {
                names.insert(captures[1].to_string());
            }
        }
        Value::Array(items) => {
            items.iter().for_each(|item| collect_placeholders(item, names));
        }
        Value::Object(map) => {
            map.values().for_each(|item| collect_placeholders(item, names));
        }
        _ => {}
    }
}

fn substitute(value: &Value, resolved: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => {
            if let Some(captures) = PLACEHOLDER.captures(s)
                && captures[0].len() == s.len()
                && let Some(whole) = resolved.get(&captures[1])
            {
                return whole.clone();
            }
            let spliced = PLACEHOLDER.replace_all(s, |captures: &regex::Captures<'_>| {
                match resolved.get(&captures[1]) {
                    Some(Value::String(text)) => text.clone(),
                    Some(other) => other.to_string(),
                    None => captures[0].to_string(),
                }
            });
            Value::String(spliced.into_owned())
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| substitute(item, resolved)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, resolved)))
                .collect(),
        ),
        other => other.clone(),
    }
}
