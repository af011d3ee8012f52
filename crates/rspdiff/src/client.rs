//! Protocol client.
//!
//! Sends pre-framed bytes and blocks until a complete reply packet (or the
//! end of the stream) arrives. One request is outstanding at a time.

use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use rspdiff_proto::{Command, Received, decode_stream};
use tracing::{debug, trace};

use crate::error::{Result, is_disconnect};

/// A connection to one server.
pub struct Client<S: Read + Write> {
    reader: BufReader<S>,
}

impl Client<TcpStream> {
    /// Connect to `addr` (`host:port`, or `:port` for localhost).
    pub fn connect(addr: &str, read_timeout: Option<Duration>) -> Result<Self> {
        let addr = if addr.starts_with(':') {
            format!("127.0.0.1{addr}")
        } else {
            addr.to_string()
        };

        let stream = TcpStream::connect(&addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(read_timeout)?;
        debug!(addr = %addr, "connected");
        Ok(Self::new(stream))
    }
}

impl<S: Read + Write> Client<S> {
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::new(stream),
        }
    }

    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Write `wire` verbatim, then read until a packet completes.
    ///
    /// The caller frames the request itself, including any leading ack.
    /// A peer that already hung up yields `Received::Closed`.
    pub fn send_and_receive(&mut self, wire: &[u8]) -> Result<Received> {
        trace!(request = %String::from_utf8_lossy(wire), "sending");
        let stream = self.reader.get_mut();
        match stream.write_all(wire).and_then(|()| stream.flush()) {
            Ok(()) => {}
            Err(e) if is_disconnect(&e) => return Ok(Received::Closed(Vec::new())),
            Err(e) => return Err(e.into()),
        }

        let received = decode_stream(&mut self.reader)?;
        trace!(
            reply = %String::from_utf8_lossy(received.bytes()),
            closed = received.is_closed(),
            "received"
        );
        Ok(received)
    }

    /// Send a command in its canonical wire form (`+$<payload>#<hh>`).
    pub fn transact(&mut self, command: &Command) -> Result<Received> {
        self.send_and_receive(&command.to_wire())
    }
}
