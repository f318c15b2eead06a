//! Driver factory.
//!
//! Protocols and transports are chosen from closed enums in the
//! configuration; there is no dynamic lookup.

use crate::command::{GcodeProtocol, JsonParameterProtocol, Protocol};
use crate::config::{DriverKind, TransportConfig};
use crate::transport::{SerialTransport, TcpTransport, Transport};

/// Protocol implementation for a driver kind.
pub fn protocol_for(kind: DriverKind) -> Box<dyn Protocol> {
    match kind {
        DriverKind::Gcode => Box::new(GcodeProtocol),
        DriverKind::JsonParameter => Box::new(JsonParameterProtocol),
    }
}

/// Transport for a link configuration.
pub fn transport_for(config: &TransportConfig) -> Box<dyn Transport> {
    match config {
        TransportConfig::Serial(settings) => Box::new(SerialTransport::new(settings.clone())),
        TransportConfig::Tcp { host, port } => Box::new(TcpTransport::new(host.clone(), *port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factories() {
        assert_eq!(protocol_for(DriverKind::Gcode).kind(), DriverKind::Gcode);
        assert_eq!(
            protocol_for(DriverKind::JsonParameter).kind(),
            DriverKind::JsonParameter
        );

        let tcp = transport_for(&TransportConfig::Tcp {
            host: "10.0.0.5".into(),
            port: 23,
        });
        assert_eq!(tcp.describe(), "tcp://10.0.0.5:23");
    }
}
