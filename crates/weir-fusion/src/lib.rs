//! Rank-fusion strategies for the weir retrieval pipeline.
//!
//! Strategies merge the ranked lists produced by heterogeneous retrievers
//! into one deterministic ranking. The factory builds them by name from
//! configuration; the learned strategy additionally consumes externally
//! trained weights through [`WeightsLoader`] with canary rollout support.

mod distribution;
mod error;
mod factory;
mod learned;
mod linear;
mod rrf;
mod simple;
mod types;
mod weighted;
mod weights;

pub use distribution::DistributionStrategy;
pub use error::{Error, Result};
pub use factory::new_strategy;
pub use learned::LearnedStrategy;
pub use linear::LinearStrategy;
pub use rrf::{DEFAULT_RRF_K, RrfStrategy, rrf_score};
pub use simple::SimpleStrategy;
pub use types::{FusionParams, FusionStrategy, RetrieverResult};
pub use weighted::WeightedStrategy;
pub use weights::{WeightSnapshot, WeightsLoader};
