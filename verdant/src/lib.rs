/**
The verdant irrigation controller is run once an hour by a scheduler such as cron.
Each invocation decides whether it is time to water, asks a forecast service
whether it is already raining, and if not walks the garden valves one at a time
by publishing commands to the valve controller box over MQTT. The process blocks
for the whole watering run and tears everything down before it exits.
*/

/// Components in the system are created by grouping together
/// devices into a logical unit that performs some function
/// for the overall control system.
pub mod components;
/// Devices that are an atomic unit, and can be composed
/// with other devices into components to perform some function.
pub mod devices;
/// Errors that abort an invocation.
pub mod error;
/// Message structure for communication out of the control
/// system, the valve commands and the log file.
pub mod messages;
/// Development utilities for locating test fixtures.
pub mod utils;
