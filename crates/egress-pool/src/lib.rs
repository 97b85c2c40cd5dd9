mod pool;

pub use pool::{EgressPool, EgressStats};
