/// Standardise how messages are sent out of the
/// current control system.
pub mod control {
    /// Valve messages go to the controller box, one
    /// number per message.
    pub mod valve;
}

/// Log file output.
pub mod logging;
