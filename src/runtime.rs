//! Runtime for pipeline stages
//!
//! I/O traits, the effect executor, and the batch harness that gives every
//! stage the same delivery contract.

mod error;
mod executor;
mod harness;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use error::{BatchError, PublishError, RecordFailure, StageError, StoreError};
pub use executor::EffectExecutor;
pub use harness::{process_batch, BatchReport};
pub use traits::*;
