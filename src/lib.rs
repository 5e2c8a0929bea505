use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod blocked;
mod graph;
mod kernel;
mod march;
mod plan;
mod schedule;
mod simple;
mod store;
mod train;
mod verify;

pub use graph::RatingsGraph;
pub use kernel::{calc_prediction, LAMBDA, LATENT_VECTOR_SIZE, MAXVAL, MINVAL};
pub use march::SliceLockTable;
pub use plan::{plan_blocks, WorkItem};
pub use schedule::{StepFunction, BOTTOU_INIT, DECAY_RATE, LEARNING_RATE};
pub use store::{FactorStore, SEED};
pub use train::{train, Algo, TrainConfig, TrainSummary, MAX_MOVIE_UPDATES};
pub use verify::rmse;
