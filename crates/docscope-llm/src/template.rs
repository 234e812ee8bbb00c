//! Prompt templates and the injectable template lookup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Placeholder passed to prompts when an optional input (keywords, samples)
/// is empty, so the rendered text stays well-formed.
pub const NOT_PROVIDED: &str = "not provided";

/// A rendered prompt ready to send to a generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Optional system instruction
    pub system: Option<String>,
    /// User message
    pub user: String,
}

/// A prompt template with `{{variable}}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Optional system instruction (may contain placeholders)
    pub system: Option<String>,
    /// User message (may contain placeholders)
    pub user: String,
    /// Marker the model is asked to put before its answer. Responses are
    /// cut after the last occurrence so echoed prompt text is discarded.
    pub response_marker: Option<String>,
}

impl Template {
    /// Create a template with only a user message.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            response_marker: None,
        }
    }

    /// Set the system instruction.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the response marker.
    pub fn with_response_marker(mut self, marker: impl Into<String>) -> Self {
        self.response_marker = Some(marker.into());
        self
    }

    /// Names of all placeholders, in order of appearance (duplicates removed).
    pub fn variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        let parts = self.system.iter().chain(std::iter::once(&self.user));
        for text in parts {
            let mut rest = text.as_str();
            while let Some(start) = rest.find("{{") {
                let after = &rest[start + 2..];
                match after.find("}}") {
                    Some(end) => {
                        let name = after[..end].trim().to_string();
                        if !names.contains(&name) {
                            names.push(name);
                        }
                        rest = &after[end + 2..];
                    }
                    None => break,
                }
            }
        }
        names
    }

    /// Substitute every placeholder. A placeholder without a value is an error.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<Prompt, LlmError> {
        let system = match &self.system {
            Some(system) => Some(substitute(system, vars)?),
            None => None,
        };
        Ok(Prompt {
            system,
            user: substitute(&self.user, vars)?,
        })
    }

    /// Strip echoed template text and surrounding quotes from a response.
    pub fn clean_response(&self, response: &str) -> String {
        let tail = match &self.response_marker {
            Some(marker) if !marker.is_empty() => {
                response.rsplit(marker.as_str()).next().unwrap_or(response)
            }
            _ => response,
        };
        tail.trim()
            .trim_matches('"')
            .trim_matches('\'')
            .trim()
            .to_string()
    }
}

fn substitute(text: &str, vars: &[(&str, &str)]) -> Result<String, LlmError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| LlmError::Template("unterminated placeholder".to_string()))?;
        let name = after[..end].trim();
        let value = vars
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| LlmError::Template(format!("no value for placeholder '{}'", name)))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Lookup from template name to template.
///
/// Callers inject their own store; nothing in the workspace keeps a global
/// registry.
pub trait TemplateStore: Send + Sync {
    /// Resolve a template by name.
    fn get(&self, name: &str) -> Option<Template>;
}

impl TemplateStore for HashMap<String, Template> {
    fn get(&self, name: &str) -> Option<Template> {
        HashMap::get(self, name).cloned()
    }
}

/// In-memory template store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTemplates {
    templates: HashMap<String, Template>,
}

impl InMemoryTemplates {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with the built-in templates:
    /// `topic_label`, `topic_summary`, `concept_rewrite`, `classifier_example`.
    pub fn with_defaults() -> Self {
        let mut store = Self::new();
        store.insert("topic_label", default_label_template());
        store.insert("topic_summary", default_summary_template());
        store.insert("concept_rewrite", default_rewrite_template());
        store.insert("classifier_example", default_example_template());
        store
    }

    /// Add or replace a template.
    pub fn insert(&mut self, name: impl Into<String>, template: Template) {
        self.templates.insert(name.into(), template);
    }

    /// Builder-style [`InMemoryTemplates::insert`].
    pub fn with(mut self, name: impl Into<String>, template: Template) -> Self {
        self.insert(name, template);
        self
    }

    /// Number of templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateStore for InMemoryTemplates {
    fn get(&self, name: &str) -> Option<Template> {
        self.templates.get(name).cloned()
    }
}

fn default_label_template() -> Template {
    Template::new(
        r#"Name the topic shared by the documents below.

Central document:
{{central_text}}

Other documents:
{{samples}}

Keywords: {{keywords}}

Respond with a concise label of 2-5 words in the format:
Topic Label: <label>"#,
    )
    .with_system("You are a data analyst who names clusters of related documents.")
    .with_response_marker("Topic Label:")
}

fn default_summary_template() -> Template {
    Template::new(
        r#"Summarize the theme shared by the documents below in one or two sentences.

Central document:
{{central_text}}

Other documents:
{{samples}}

Keywords: {{keywords}}

Respond in the format:
Topic Summary: <summary>"#,
    )
    .with_system("You are a data analyst who summarizes clusters of related documents.")
    .with_response_marker("Topic Summary:")
}

fn default_rewrite_template() -> Template {
    Template::new(
        r#"Rewrite the document below through the lens of "{{concept}}".
Keep its length and subject, but make the concept clearly present.

Document:
{{document}}

Respond in the format:
Rewritten Document: <text>"#,
    )
    .with_system("You are a careful writer who adapts documents to a requested theme.")
    .with_response_marker("Rewritten Document:")
}

fn default_example_template() -> Template {
    Template::new(
        r#"Write one realistic short document that belongs to the category "{{label}}".
Category description: {{description}}
This is example number {{sample_number}}; make it different from typical examples.

Respond in the format:
Example: <text>"#,
    )
    .with_system("You write diverse, realistic example documents for text classifiers.")
    .with_response_marker("Example:")
}
