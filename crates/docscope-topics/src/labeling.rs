//! Topic label and summary generation through the generation service.

use docscope_llm::{CostTracker, ServiceContext, Template, NOT_PROVIDED};
use docscope_types::{Result, TopicSettings};

/// Prompt material describing one topic.
#[derive(Debug, Clone)]
pub struct TopicContext<'a> {
    /// Text of the centroid document
    pub central_text: &'a str,
    /// Texts of the diverse samples
    pub samples: Vec<&'a str>,
    /// Ranked keyword strings
    pub keywords: Vec<&'a str>,
}

impl TopicContext<'_> {
    /// Template variables; empty lists become the "not provided" sentinel so
    /// the rendered prompt stays well-formed.
    fn variables(&self) -> (String, String) {
        let samples = if self.samples.is_empty() {
            NOT_PROVIDED.to_string()
        } else {
            self.samples.join("\n---\n")
        };
        let keywords = if self.keywords.is_empty() {
            NOT_PROVIDED.to_string()
        } else {
            self.keywords.join(", ")
        };
        (samples, keywords)
    }
}

/// Generates topic labels and summaries with pre-resolved templates.
#[derive(Debug, Clone)]
pub struct TopicLabeler {
    services: ServiceContext,
    label: Option<Template>,
    summary: Option<Template>,
}

impl TopicLabeler {
    /// Resolve the templates for the requested outputs.
    ///
    /// Fails with `MissingTemplate` when a requested template is not in
    /// the store, before any generation call is made.
    pub fn resolve(
        services: ServiceContext,
        settings: &TopicSettings,
        want_label: bool,
        want_summary: bool,
    ) -> Result<Self> {
        let label = want_label
            .then(|| services.template(&settings.label_template))
            .transpose()?;
        let summary = want_summary
            .then(|| services.template(&settings.summary_template))
            .transpose()?;
        Ok(Self {
            services,
            label,
            summary,
        })
    }

    pub fn generates_label(&self) -> bool {
        self.label.is_some()
    }

    pub fn generates_summary(&self) -> bool {
        self.summary.is_some()
    }

    /// Generate `(label, summary)`; outputs that were not requested come
    /// back empty.
    pub async fn describe(
        &self,
        context: &TopicContext<'_>,
        cost: &CostTracker,
    ) -> Result<(String, String)> {
        let (samples, keywords) = context.variables();
        let vars = [
            ("central_text", context.central_text),
            ("samples", samples.as_str()),
            ("keywords", keywords.as_str()),
        ];

        let label = match &self.label {
            Some(template) => self.services.generate(template, &vars, cost).await?,
            None => String::new(),
        };
        let summary = match &self.summary {
            Some(template) => self.services.generate(template, &vars, cost).await?,
            None => String::new(),
        };
        Ok((label, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docscope_llm::{InMemoryTemplates, MockEmbedder, MockGenerator, Prompt};
    use docscope_types::DocscopeError;
    use std::sync::Arc;

    fn services(generator: MockGenerator, templates: InMemoryTemplates) -> ServiceContext {
        ServiceContext::new(
            Arc::new(generator),
            Arc::new(MockEmbedder::new(8)),
            Arc::new(templates),
        )
    }

    fn context() -> TopicContext<'static> {
        TopicContext {
            central_text: "rust borrow checker",
            samples: vec![],
            keywords: vec!["rust", "borrow"],
        }
    }

    #[tokio::test]
    async fn test_describe_strips_echoed_prompt() {
        let generator = MockGenerator::with_responder(|prompt: &Prompt| {
            Ok(format!("{}\nTopic Label: \"Rust Ownership\"", prompt.user))
        });
        let labeler = TopicLabeler::resolve(
            services(generator, InMemoryTemplates::with_defaults()),
            &TopicSettings::default(),
            true,
            false,
        )
        .unwrap();

        let cost = CostTracker::new();
        let (label, summary) = labeler.describe(&context(), &cost).await.unwrap();
        assert_eq!(label, "Rust Ownership");
        assert!(summary.is_empty());
    }

    #[tokio::test]
    async fn test_empty_samples_use_sentinel() {
        let generator = MockGenerator::echo();
        let templates = InMemoryTemplates::new()
            .with("topic_label", Template::new("{{samples}}|{{keywords}}"));
        let labeler = TopicLabeler::resolve(
            services(generator, templates),
            &TopicSettings::default(),
            true,
            false,
        )
        .unwrap();

        let (label, _) = labeler.describe(&context(), &CostTracker::new()).await.unwrap();
        assert_eq!(label, format!("{NOT_PROVIDED}|rust, borrow"));
    }

    #[test]
    fn test_missing_template() {
        let err = TopicLabeler::resolve(
            services(MockGenerator::echo(), InMemoryTemplates::new()),
            &TopicSettings::default(),
            false,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, DocscopeError::MissingTemplate(name) if name == "topic_summary"));
    }

    #[test]
    fn test_nothing_requested_needs_no_templates() {
        let labeler = TopicLabeler::resolve(
            services(MockGenerator::echo(), InMemoryTemplates::new()),
            &TopicSettings::default(),
            false,
            false,
        )
        .unwrap();
        assert!(!labeler.generates_label());
        assert!(!labeler.generates_summary());
    }
}
