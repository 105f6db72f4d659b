mod aggregator;
mod bulker;
mod config;
mod error;
mod future;
mod orchestrator;
mod processor;
mod sequence;
mod transport;
mod work;


pub use crate::bulker::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::future::{Settled, WorkFuture};
pub use crate::orchestrator::*;
pub use crate::processor::*;
pub use crate::sequence::*;
pub use crate::transport::*;
pub use crate::work::*;
