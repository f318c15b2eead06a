//! TCP transport.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use super::{Link, Transport, READ_POLL};

/// TCP socket link.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    host: String,
    port: u16,
}

impl TcpTransport {
    /// Create a transport for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self, timeout: Duration) -> io::Result<Link> {
        let mut last_error = None;

        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(Some(READ_POLL))?;
                    let reader = stream.try_clone()?;
                    debug!(%addr, "TCP link open");
                    return Ok(Link {
                        reader: Box::new(reader),
                        writer: Box::new(stream),
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} did not resolve", self.describe()),
            )
        }))
    }

    fn describe(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    #[test]
    fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let mut stream = stream;
            stream.write_all(b"ok\n").unwrap();
            line
        });

        let mut transport = TcpTransport::new("127.0.0.1", port);
        let mut link = transport.open(Duration::from_secs(1)).unwrap();
        link.writer.write_all(b"M114\n").unwrap();

        let mut buf = [0u8; 16];
        let n = loop {
            match link.reader.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) => panic!("read failed: {}", e),
            }
        };
        assert_eq!(&buf[..n], b"ok\n");
        assert_eq!(server.join().unwrap(), "M114\n");
        assert_eq!(transport.describe(), format!("tcp://127.0.0.1:{}", port));
    }
}
