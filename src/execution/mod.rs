// Position reconciliation and order execution
pub mod order;
pub mod position;

pub use order::{ExecutionPolicy, OrderExecutor, OrderIntent, OrderOutcome, OrderRequest};
pub use position::{PositionError, PositionView};
