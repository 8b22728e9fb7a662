use std::fmt;

/// Command understood by the valve controller box. The controller
/// listens on a single topic and reads the payload as a bare decimal
/// integer, where zero shuts every valve and any other number opens
/// that valve.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValveCommand {
    /// Close every valve on the controller, payload `0`.
    CloseAll,
    /// Open the valve with the given number, payload `n`.
    Open(u8),
}

impl ValveCommand {
    /// Identifier as sent on the wire.
    pub fn valve_number(&self) -> u8 {
        match self {
            ValveCommand::CloseAll => 0,
            ValveCommand::Open(valve_number) => *valve_number,
        }
    }

    /// Bytes published to the broker.
    pub fn payload(&self) -> Vec<u8> {
        self.valve_number().to_string().into_bytes()
    }
}

impl fmt::Display for ValveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValveCommand::CloseAll => write!(f, "close all valves"),
            ValveCommand::Open(valve_number) => write!(f, "open valve #{valve_number}"),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ValveCommand::CloseAll, b"0".to_vec())]
    #[case(ValveCommand::Open(1), b"1".to_vec())]
    #[case(ValveCommand::Open(7), b"7".to_vec())]
    #[case(ValveCommand::Open(12), b"12".to_vec())]
    fn test_command_payload(#[case] command: ValveCommand, #[case] expected: Vec<u8>) {
        assert_eq!(command.payload(), expected, "Unexpected payload on the wire");
    }

    #[test]
    fn test_close_all_is_valve_zero() {
        assert_eq!(ValveCommand::CloseAll.valve_number(), 0);
        assert_ne!(ValveCommand::Open(1), ValveCommand::CloseAll);
    }
}
