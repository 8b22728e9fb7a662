/// Components that look after the garden.
pub mod garden {
    /// Decides when a run is due.
    pub mod schedule;
    /// Valve config, sequencing and the full invocation.
    pub mod irrigation;
}

/// Helpful prelude when working with components.
pub mod prelude {
    pub use crate::components::garden::irrigation::*;
    pub use crate::components::garden::schedule::*;
}
