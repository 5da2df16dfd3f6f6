//! Message passing between partitions.

pub mod communicator;
pub mod exchange;
pub mod wire;

pub use exchange::exchange_round;
