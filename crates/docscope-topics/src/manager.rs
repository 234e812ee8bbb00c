//! Populates named topic levels on an index.
//!
//! Rebuilding a level key that already exists always overwrites it. Callers
//! that only want to fill in missing levels (for example before plotting)
//! should check [`DocumentIndex::has_level`] first; this manager never skips
//! an existing key on its own.

use std::collections::BTreeSet;

use docscope_index::{DocumentIndex, TopicMetadata};
use docscope_llm::{CostTracker, ServiceContext};
use docscope_llm::try_join_bounded;
use docscope_types::{DocscopeError, LevelKey, Result, ServiceSettings, TopicSettings};
use tracing::{debug, info, instrument};

use crate::builder::TopicBuilder;
use crate::clusterer::{topic_count, validate_cut, Cut, HierarchicalClusterer};
use crate::labeling::TopicLabeler;

/// Orchestrates clustering and per-topic construction for whole levels.
#[derive(Debug, Clone)]
pub struct TopicHierarchyManager {
    settings: TopicSettings,
    clusterer: HierarchicalClusterer,
    services: Option<ServiceContext>,
    generate_labels: bool,
    generate_summaries: bool,
}

impl TopicHierarchyManager {
    /// Manager that builds structure only (no generated text).
    pub fn new(settings: TopicSettings) -> Self {
        Self {
            settings,
            clusterer: HierarchicalClusterer::new(),
            services: None,
            generate_labels: false,
            generate_summaries: false,
        }
    }

    /// Use these services for label/summary generation.
    pub fn with_services(mut self, services: ServiceContext) -> Self {
        self.services = Some(services);
        self
    }

    /// Request generated labels and/or summaries for every built topic.
    pub fn with_generation(mut self, labels: bool, summaries: bool) -> Self {
        self.generate_labels = labels;
        self.generate_summaries = summaries;
        self
    }

    /// Default topic count for `n` documents: `2 * ceil(ln n)`, kept in `1..n`.
    pub fn default_topic_count(n: usize) -> usize {
        let k = 2 * (n as f64).ln().ceil().max(0.0) as usize;
        k.clamp(1, n.saturating_sub(1).max(1))
    }

    fn max_concurrency(&self) -> usize {
        self.services
            .as_ref()
            .map_or_else(|| ServiceSettings::default().max_concurrency, |s| s.max_concurrency)
    }

    fn labeler(&self, want_label: bool, want_summary: bool) -> Result<Option<TopicLabeler>> {
        if !want_label && !want_summary {
            return Ok(None);
        }
        match &self.services {
            Some(services) => Ok(Some(TopicLabeler::resolve(
                services.clone(),
                &self.settings,
                want_label,
                want_summary,
            )?)),
            None => {
                let name = if want_label {
                    &self.settings.label_template
                } else {
                    &self.settings.summary_template
                };
                Err(DocscopeError::MissingTemplate(name.clone()))
            }
        }
    }

    /// Cut the dendrogram at `k` topics and/or height `h` and (re)build one
    /// level per distinct resulting topic count.
    ///
    /// With neither `k` nor `h` and no levels on the index yet, a default
    /// level of [`default_topic_count`](Self::default_topic_count) topics is
    /// built. Returns the keys written.
    #[instrument(skip(self, index, cost), fields(documents = index.len()))]
    pub async fn build_topics(
        &self,
        index: &mut DocumentIndex,
        k: Option<usize>,
        h: Option<f32>,
        cost: &CostTracker,
    ) -> Result<Vec<LevelKey>> {
        let mut cuts = Vec::new();
        cuts.extend(k.map(Cut::Topics));
        cuts.extend(h.map(Cut::Height));
        if cuts.is_empty() {
            if !index.topic_levels().is_empty() {
                debug!("No cut requested and levels already exist");
                return Ok(Vec::new());
            }
            if index.len() < 2 {
                return Err(DocscopeError::invalid(
                    "at least two documents are needed for a default topic level",
                ));
            }
            cuts.push(Cut::Topics(Self::default_topic_count(index.len())));
        }

        let labeler = self.labeler(self.generate_labels, self.generate_summaries)?;
        for &cut in &cuts {
            validate_cut(index.len(), cut)?;
        }
        self.clusterer.ensure_offloaded(index).await?;

        let mut assignments = Vec::new();
        let mut seen = BTreeSet::new();
        for cut in cuts {
            let assignment = self.clusterer.cut(index, cut)?;
            let count = topic_count(&assignment);
            if seen.insert(count) {
                assignments.push((count, assignment));
            }
        }

        let mut written = Vec::new();
        for (count, assignment) in assignments {
            let key = LevelKey::Count(count);
            let topics = self
                .build_level(index, &assignment, count, &key, labeler.clone(), cost)
                .await?;
            index.set_topic_level(key.clone(), topics)?;
            written.push(key);
        }

        info!(levels = ?written, cost = cost.total(), "Built topic levels");
        Ok(written)
    }

    /// Build a level from an externally computed per-document assignment.
    ///
    /// Distinct values of `assignment` become topics `1..=C` in ascending
    /// order; when `labels` are given, topic `c` is labelled `labels[c - 1]`
    /// and no label is generated. The dendrogram is not touched.
    #[instrument(skip(self, index, assignment, labels, cost), fields(documents = index.len()))]
    pub async fn build_custom_topics(
        &self,
        index: &mut DocumentIndex,
        assignment: &[i64],
        name: &str,
        labels: Option<&[String]>,
        cost: &CostTracker,
    ) -> Result<LevelKey> {
        if assignment.len() != index.len() {
            return Err(DocscopeError::invalid(format!(
                "assignment has {} entries but the index has {} documents",
                assignment.len(),
                index.len()
            )));
        }
        if name.trim().is_empty() {
            return Err(DocscopeError::invalid("custom level name is empty"));
        }

        let classes: Vec<i64> = assignment
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if let Some(labels) = labels {
            if labels.len() < classes.len() {
                return Err(DocscopeError::invalid(format!(
                    "{} labels supplied for {} assigned classes",
                    labels.len(),
                    classes.len()
                )));
            }
        }

        let dense: Vec<usize> = assignment
            .iter()
            .map(|value| classes.binary_search(value).map(|pos| pos + 1))
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| DocscopeError::invalid("assignment value missing from class set"))?;

        let want_label = self.generate_labels && labels.is_none();
        let labeler = self.labeler(want_label, self.generate_summaries)?;

        let key = LevelKey::Name(name.to_string());
        let mut topics = self
            .build_level(index, &dense, classes.len(), &key, labeler, cost)
            .await?;
        if let Some(labels) = labels {
            for topic in topics.iter_mut() {
                topic.label = labels[topic.topic_index - 1].clone();
            }
        }

        index.set_topic_level(key.clone(), topics)?;
        info!(level = %key, topics = classes.len(), "Built custom topic level");
        Ok(key)
    }

    /// Build the topics of one level with at most `max_concurrency` in
    /// flight. Any failing topic fails the level; results are kept in topic
    /// order.
    async fn build_level(
        &self,
        index: &DocumentIndex,
        assignment: &[usize],
        count: usize,
        key: &LevelKey,
        labeler: Option<TopicLabeler>,
        cost: &CostTracker,
    ) -> Result<Vec<TopicMetadata>> {
        let mut builder = TopicBuilder::new(
            index,
            self.settings.num_samples,
            self.settings.num_keywords,
        );
        if let Some(labeler) = labeler {
            builder = builder.with_labeler(labeler);
        }
        let builder = &builder;

        try_join_bounded(
            (1..=count).map(|topic| builder.build(assignment, topic, key, cost)),
            self.max_concurrency(),
        )
        .await
    }
}
