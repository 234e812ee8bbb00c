//! Probes: small logistic models trained on synthetic or labelled text and
//! applied to every document of an index.
//!
//! - [`ConceptProbe`] scores how strongly a document expresses a concept.
//! - [`SpectrumProbe`] places documents between two opposing poles.
//! - [`ClassifierProbe`] assigns class probabilities over a label set.
//!
//! Each probe walks the [`ProbeState`] lifecycle and is applied with
//! [`score`].

pub mod classifier;
pub mod concept;
pub mod crossval;
pub mod logistic;
pub mod scorer;
pub mod spectrum;
pub mod state;
mod training;

pub use classifier::{best_labels, ClassifierProbe, ClassifierTrainer, LabeledExamples};
pub use concept::{ConceptProbe, ConceptTrainer};
pub use crossval::{create_folds, CrossValidator};
pub use logistic::{Coefficients, Targets};
pub use scorer::{score, Probe, Scored};
pub use spectrum::{SpectrumProbe, SpectrumTrainer};
pub use state::{ProbeState, ProbeWarning, TrainReport};
