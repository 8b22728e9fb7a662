/// Devices are the atomic units that can be combined together
/// into components. Their core responsibilities do not change
/// based on location, name etc.
pub mod hardware {
    /// Device interface for the valve controller box.
    pub mod valve_controller;
}

/// Services reached over the network rather than wired to the machine.
pub mod software {
    /// Rain veto from the weather forecast.
    pub mod weather;
}
