//! Serial port transport.

use std::io;
use std::time::Duration;

use crate::config::SerialSettings;

use super::{Link, Transport};

/// Serial port link.
#[derive(Debug, Clone)]
pub struct SerialTransport {
    settings: SerialSettings,
}

impl SerialTransport {
    /// Create a transport for a port.
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }
}

#[cfg(feature = "serial")]
impl Transport for SerialTransport {
    fn open(&mut self, timeout: Duration) -> io::Result<Link> {
        use serialport::{DataBits, FlowControl, Parity, StopBits};

        use crate::config::{Parity as ConfigParity, SerialFlowControl};

        let s = &self.settings;
        let data_bits = match s.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };
        let stop_bits = if s.stop_bits == 2 {
            StopBits::Two
        } else {
            StopBits::One
        };
        let parity = match s.parity {
            ConfigParity::None => Parity::None,
            ConfigParity::Odd => Parity::Odd,
            ConfigParity::Even => Parity::Even,
        };
        let flow_control = match s.flow_control {
            SerialFlowControl::None => FlowControl::None,
            SerialFlowControl::Software => FlowControl::Software,
            SerialFlowControl::Hardware => FlowControl::Hardware,
        };

        // Serial opens are local; the connect timeout bounds the first read.
        let mut port = serialport::new(&s.port, s.baud)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(super::READ_POLL.min(timeout))
            .open()?;

        port.write_data_terminal_ready(s.dtr)?;
        if flow_control != FlowControl::Hardware {
            port.write_request_to_send(s.rts)?;
        }

        let reader = port.try_clone()?;
        tracing::debug!(port = %s.port, baud = s.baud, "Serial link open");
        Ok(Link {
            reader: Box::new(reader),
            writer: Box::new(port),
        })
    }

    fn describe(&self) -> String {
        format!("serial://{}@{}", self.settings.port, self.settings.baud)
    }
}

#[cfg(not(feature = "serial"))]
impl Transport for SerialTransport {
    fn open(&mut self, _timeout: Duration) -> io::Result<Link> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "serial support not compiled in",
        ))
    }

    fn describe(&self) -> String {
        format!("serial://{}@{}", self.settings.port, self.settings.baud)
    }
}
