//! Statewalk Diagnose: root-cause diagnosis for cluster error messages
//!
//! ```text
//! message ─► KindClassifier ─► DestinationLocator ─► PathFinder (metagraph)
//!                                                        │ shortest paths
//!                                                        ▼
//!                       SynthesisLoop: generative ×3 ─► template fallback
//!                                                        │ rows (stategraph)
//!                                                        ▼
//!                                       filter_compatible ─► ClueAggregator
//!                                                        │ StateResolver
//!                                                        ▼
//!                                                      Report
//! ```
//!
//! ## Module Organization
//!
//! - `config`: `DiagnosisConfig` and its file/env loading
//! - `resolver`: temporal state resolution
//! - `path_finder`: four-strategy typed path discovery
//! - `metapath`: extended metapath rendering and parsing
//! - `synthesis`: generative and template synthesizers and the repair loop
//! - `filter`: message compatibility of result rows
//! - `aggregator`: clue collection and the summarizing report
//! - `locator`: source-kind classification and destination locating
//! - `prompts`: assistant instructions and prompt text
//! - `pipeline`: the `Diagnoser`

pub mod aggregator;
pub mod config;
pub mod error;
pub mod filter;
pub mod locator;
pub mod metapath;
pub mod path_finder;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod resolver;
pub mod synthesis;

pub use aggregator::ClueAggregator;
pub use config::{ConfigError, DiagnosisConfig};
pub use error::DiagnoseError;
pub use filter::{filter_compatible, message_compatible};
pub use locator::{DestinationLocator, EventKindClassifier, FixedKind, KindClassifier, Located};
pub use metapath::{Metapath, Segment};
pub use path_finder::{PathDiscovery, PathFinder, Strategy};
pub use pipeline::{BatchEntry, Diagnoser, Diagnosis, PathAnalysis};
pub use report::{Clue, ClueOutcome, EntityClues, Report, ReportStatus, Summary};
pub use resolver::StateResolver;
pub use synthesis::{
    GenerativeSynthesizer, QuerySynthesizer, Synthesis, SynthesisLoop, TemplateSynthesizer,
};
