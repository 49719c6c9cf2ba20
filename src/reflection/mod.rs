//! Reflection engine
//!
//! Background consolidation of the long-term graph:
//!
//! - **Curation**: resolves contradictory functional edges
//! - **Prioritization**: boosts, decays and promotes node activation
//! - **Synthesis**: derives insight nodes from pairs of core knowledge
//! - **Anticipation**: mines behavioral patterns from transcripts
//!
//! Curation always finishes before the other three, which run concurrently.

pub mod anticipation;
pub mod curation;
pub mod engine;
pub mod evaluator;
pub mod prioritization;
pub mod synthesis;
pub mod transcript;

pub use anticipation::{mine_patterns, AnticipationReport, Anticipator, ProactiveAlert};
pub use curation::{precedence, CurationReport, Curator, IntegrityReport};
pub use engine::{CycleReport, EngineState, EngineStats, ReflectionEngine};
pub use evaluator::{InsightEvaluator, InsightRequest, InsightResponse, NodeBrief, PathEvaluator};
pub use prioritization::{
    calculate_traversal_cost, decayed_activation, PassReport, PrioritizationReport, Prioritizer,
    MAX_TRAVERSAL_COST,
};
pub use synthesis::{SynthesisReport, Synthesizer};
pub use transcript::{extract_topic, load_transcripts, transcript_key, TranscriptEntry};
