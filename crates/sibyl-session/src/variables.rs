//! User-defined variables and `{name}` placeholder resolution.
//!
//! Resolution expands to a fixpoint in a single call: values may themselves
//! contain placeholders, and re-resolving the output changes nothing. The
//! store stays acyclic because [`VariableStore::set`] rejects definitions
//! that would close a reference cycle; a runtime guard still cuts cycles
//! smuggled in through hand-edited JSON.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::{Result, SessionError};

/// Placeholder names are word characters between braces.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern"));

/// A single name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
}

/// Result of resolving placeholders in a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Text with every defined placeholder expanded.
    pub text: String,
    /// Names that stayed verbatim: undefined, or part of a definition cycle.
    pub unresolved: Vec<String>,
}

impl Resolution {
    /// True when every placeholder was expanded.
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Ordered variable store. Insertion order is preserved for listing;
/// updating an existing name keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableStore {
    vars: Vec<Variable>,
}

impl VariableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or update a variable.
    ///
    /// Names are trimmed; empty names and names containing a substitution
    /// delimiter are rejected. Values whose placeholders would close a
    /// reference cycle are rejected so resolution always terminates.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        let name = name.trim();
        let value = value.into();

        if name.is_empty() {
            return Err(SessionError::invalid_name(name, "name is empty"));
        }
        if name.contains('{') || name.contains('}') {
            return Err(SessionError::invalid_name(
                name,
                "name contains a substitution delimiter",
            ));
        }
        if self.would_cycle(name, &value) {
            return Err(SessionError::invalid_definition(
                name,
                "value creates a reference cycle",
            ));
        }

        match self.vars.iter_mut().find(|v| v.name == name) {
            Some(var) => var.value = value,
            None => self.vars.push(Variable {
                name: name.to_string(),
                value,
            }),
        }
        Ok(())
    }

    /// Would defining `name = value` make `name` reachable from its own
    /// value through existing definitions?
    fn would_cycle(&self, name: &str, value: &str) -> bool {
        let mut stack: Vec<String> = placeholder_names(value);
        let mut visited: Vec<String> = Vec::new();

        while let Some(next) = stack.pop() {
            if next == name {
                return true;
            }
            if visited.contains(&next) {
                continue;
            }
            if let Some(existing) = self.get(&next) {
                stack.extend(placeholder_names(existing));
            }
            visited.push(next);
        }
        false
    }

    /// Look up a variable's value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }

    /// Remove a variable. Returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.vars.len();
        self.vars.retain(|v| v.name != name);
        self.vars.len() != before
    }

    /// Variables in insertion order.
    pub fn list(&self) -> &[Variable] {
        &self.vars
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Expand every defined `{name}` placeholder in `text`.
    ///
    /// Unknown names stay verbatim and are reported once each in
    /// [`Resolution::unresolved`].
    pub fn resolve(&self, text: &str) -> Resolution {
        let mut unresolved = Vec::new();
        let text = self.expand(text, &mut Vec::new(), &mut unresolved);

        let mut seen = Vec::with_capacity(unresolved.len());
        for name in unresolved {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }

        Resolution {
            text,
            unresolved: seen,
        }
    }

    fn expand(&self, text: &str, active: &mut Vec<String>, unresolved: &mut Vec<String>) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(text) {
            let whole = caps.get(0).expect("capture 0 always present");
            let name = &caps[1];
            out.push_str(&text[last..whole.start()]);

            if active.iter().any(|n| n == name) {
                // Definition cycle: keep the placeholder as written.
                out.push_str(whole.as_str());
                unresolved.push(name.to_string());
            } else if let Some(value) = self.get(name) {
                active.push(name.to_string());
                let expanded = self.expand(value, active, unresolved);
                active.pop();
                out.push_str(&expanded);
            } else {
                out.push_str(whole.as_str());
                unresolved.push(name.to_string());
            }

            last = whole.end();
        }

        out.push_str(&text[last..]);
        out
    }
}

/// Placeholder names referenced by a piece of text.
fn placeholder_names(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}
