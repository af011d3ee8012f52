//! Protocol server.
//!
//! Serves one client at a time over a blocking byte stream. Each session
//! loops: read one byte; drop `+`; on `$` collect the frame up to `#xy`,
//! acknowledge it, dispatch the command to the debuggee and send the framed
//! reply. Kill, a closed connection or any other leading byte ends the
//! session.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use rspdiff_proto::packet::{ACK, NACK, PACKET_START};
use rspdiff_proto::{
    Command, ERR_INVALID_ARGS, ERR_TOO_LARGE, Received, Reply, decode_stream, hex, packet,
};
use rspdiff_target::{Debuggee, REGISTER_IMAGE_SIZE};
use tracing::{debug, info, trace, warn};

use crate::error::{Result, is_disconnect};
use crate::metrics;

/// Largest memory read served by default (64 KiB).
pub const DEFAULT_MAX_MEMORY_READ: u64 = 1 << 16;

/// Server options.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Reject frames whose checksum does not match with `-`.
    pub verify_checksums: bool,
    /// Read deadline applied to TCP connections.
    pub read_timeout: Option<Duration>,
    /// Upper bound on the length of an `m` request.
    pub max_memory_read: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            verify_checksums: false,
            read_timeout: None,
            max_memory_read: DEFAULT_MAX_MEMORY_READ,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub const fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_memory_read(mut self, max: u64) -> Self {
        self.max_memory_read = max;
        self
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent `k`.
    Killed,
    /// The connection closed.
    Closed,
    /// A byte other than `+` or `$` arrived between packets.
    UnexpectedByte(u8),
}

/// Serves the remote protocol for one debuggee.
pub struct ProtocolServer<D> {
    debuggee: D,
    config: ServerConfig,
}

impl<D: Debuggee> ProtocolServer<D> {
    pub fn new(debuggee: D) -> Self {
        Self::with_config(debuggee, ServerConfig::default())
    }

    pub const fn with_config(debuggee: D, config: ServerConfig) -> Self {
        Self { debuggee, config }
    }

    pub const fn debuggee(&self) -> &D {
        &self.debuggee
    }

    /// Bind `addr`, accept a single client and serve it.
    ///
    /// `addr` is `host:port` or `:port` (shorthand for `127.0.0.1:port`).
    pub fn listen(&mut self, addr: &str) -> Result<SessionEnd> {
        let addr = if addr.starts_with(':') {
            format!("127.0.0.1{addr}")
        } else {
            addr.to_string()
        };

        let listener = TcpListener::bind(&addr)?;
        info!(addr = %listener.local_addr()?, "waiting for connection");
        self.accept(&listener)
    }

    /// Accept one client from an already bound listener and serve it.
    pub fn accept(&mut self, listener: &TcpListener) -> Result<SessionEnd> {
        let (stream, peer) = listener.accept()?;
        info!(peer = %peer, "client connected");
        self.serve_tcp(stream)
    }

    /// Serve an accepted TCP connection.
    pub fn serve_tcp(&mut self, stream: TcpStream) -> Result<SessionEnd> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "cannot set TCP_NODELAY");
        }
        stream.set_read_timeout(self.config.read_timeout)?;
        self.serve_connection(stream)
    }

    /// Run one session over any byte stream until it ends.
    pub fn serve_connection<S: Read + Write>(&mut self, stream: S) -> Result<SessionEnd> {
        let mut reader = BufReader::new(stream);
        match self.session(&mut reader) {
            Err(crate::Error::Io(e)) if is_disconnect(&e) => {
                info!(error = %e, "client disconnected");
                Ok(SessionEnd::Closed)
            }
            other => other,
        }
    }

    fn session<S: Read + Write>(&mut self, reader: &mut BufReader<S>) -> Result<SessionEnd> {
        loop {
            let Some(byte) = read_byte(reader)? else {
                info!("client left");
                return Ok(SessionEnd::Closed);
            };

            match byte {
                ACK => trace!("ack"),
                PACKET_START => {
                    let body = match decode_stream(reader)? {
                        Received::Packet(body) => body,
                        Received::Closed(partial) => {
                            info!(partial = %String::from_utf8_lossy(&partial), "client left mid-packet");
                            return Ok(SessionEnd::Closed);
                        }
                    };
                    metrics::record_packet();

                    // body is `<payload>#xy`
                    let (payload, trailer) = body.split_at(body.len() - 3);
                    if self.config.verify_checksums && !checksum_matches(payload, &trailer[1..]) {
                        warn!(
                            payload = %String::from_utf8_lossy(payload),
                            received = %String::from_utf8_lossy(&trailer[1..]),
                            "checksum mismatch, requesting retransmission"
                        );
                        metrics::record_checksum_failure();
                        send(reader, &[NACK])?;
                        continue;
                    }
                    send(reader, &[ACK])?;

                    match self.dispatch(payload) {
                        Some(reply) => send(reader, &reply.to_packet())?,
                        None => {
                            info!("killed by client");
                            return Ok(SessionEnd::Killed);
                        }
                    }
                }
                other => {
                    warn!(
                        byte = format!("{other:#04x}"),
                        "received unknown async command, closing session"
                    );
                    return Ok(SessionEnd::UnexpectedByte(other));
                }
            }
        }
    }

    fn dispatch(&mut self, payload: &[u8]) -> Option<Reply> {
        match Command::parse(payload) {
            Ok(command) => {
                debug!(command = %command, "received command");
                metrics::record_command(command.name());
                self.handle(&command)
            }
            Err(e) => {
                warn!(error = %e, "rejecting malformed command");
                Some(Reply::Error(ERR_INVALID_ARGS))
            }
        }
    }

    /// Execute one command against the debuggee.
    ///
    /// Returns `None` for `k`, which ends the session without a reply.
    pub fn handle(&mut self, command: &Command) -> Option<Reply> {
        match command {
            Command::QueryStatus => Some(Reply::stopped()),
            Command::Kill => None,
            Command::SingleStep => {
                let code = self.debuggee.step();
                debug!(code, "step returned");
                Some(Reply::stopped())
            }
            Command::Continue => {
                let code = self.debuggee.resume();
                debug!(code, "continue returned");
                Some(Reply::stopped())
            }
            Command::ReadRegisters => {
                let mut image = vec![0; REGISTER_IMAGE_SIZE];
                let code = self.debuggee.read_registers(&mut image);
                trace!(code, "read registers");
                Some(Reply::Registers(image))
            }
            Command::ReadMemory { addr, len } => {
                if *len > self.config.max_memory_read {
                    warn!(len, max = self.config.max_memory_read, "memory read too large");
                    return Some(Reply::Error(ERR_TOO_LARGE));
                }
                let Ok(len) = usize::try_from(*len) else {
                    return Some(Reply::Error(ERR_TOO_LARGE));
                };
                let mut data = vec![0; len];
                let code = self.debuggee.read_memory(*addr, &mut data);
                trace!(code, addr = format!("{addr:#x}"), len, "read memory");
                Some(Reply::Memory(data))
            }
            Command::Unsupported(raw) => {
                warn!(
                    payload = %String::from_utf8_lossy(raw),
                    "unsupported command, replying empty"
                );
                Some(Reply::Empty)
            }
        }
    }
}

fn checksum_matches(payload: &[u8], digits: &[u8]) -> bool {
    hex::decode(digits).is_ok_and(|sum| sum == [packet::checksum(payload)])
}

fn read_byte<R: BufRead>(reader: &mut R) -> io::Result<Option<u8>> {
    loop {
        let byte = match reader.fill_buf() {
            Ok(buf) => buf.first().copied(),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if byte.is_some() {
            reader.consume(1);
        }
        return Ok(byte);
    }
}

fn send<S: Read + Write>(reader: &mut BufReader<S>, bytes: &[u8]) -> io::Result<()> {
    let stream = reader.get_mut();
    stream.write_all(bytes)?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rspdiff_target::{PatternDebuggee, REGISTER_IMAGE_HEX_LEN};

    /// In-memory stream: reads from a fixed script, records writes.
    struct Scripted {
        input: io::Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Scripted {
        fn new(input: &[u8]) -> Self {
            Self {
                input: io::Cursor::new(input.to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn run(input: &[u8]) -> (SessionEnd, Vec<u8>) {
        run_with(ServerConfig::default(), input)
    }

    fn run_with(config: ServerConfig, input: &[u8]) -> (SessionEnd, Vec<u8>) {
        let mut server = ProtocolServer::with_config(PatternDebuggee::new(), config);
        let mut stream = Scripted::new(input);
        let end = server.serve_connection(&mut stream).unwrap();
        (end, stream.output)
    }

    #[test]
    fn test_status_query() {
        let (end, out) = run(b"+$?#3f");
        assert_eq!(end, SessionEnd::Closed);
        assert_eq!(out, b"+$S05#b8");
    }

    #[test]
    fn test_status_is_idempotent() {
        let (_, out) = run(b"+$?#3f+$?#3f+$?#3f");
        assert_eq!(out, b"+$S05#b8+$S05#b8+$S05#b8");
    }

    #[test]
    fn test_kill_sends_only_ack() {
        let (end, out) = run(b"+$k#6b+$?#3f");
        assert_eq!(end, SessionEnd::Killed);
        assert_eq!(out, b"+");
    }

    #[test]
    fn test_step_and_continue_reply_stopped() {
        let (_, out) = run(b"+$s#73+$c#63");
        assert_eq!(out, b"+$S05#b8+$S05#b8");
    }

    #[test]
    fn test_register_reply_size() {
        let (_, out) = run(b"+$g#67");
        let frame = rspdiff_proto::Frame::parse(&out).unwrap();
        assert_eq!(frame.payload.len(), REGISTER_IMAGE_HEX_LEN);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_registers_reflect_steps() {
        let mut server = ProtocolServer::new(PatternDebuggee::new());
        server.handle(&Command::SingleStep);
        let Some(Reply::Registers(image)) = server.handle(&Command::ReadRegisters) else {
            panic!("expected register reply");
        };
        assert_eq!(image[32], 1);
        assert_eq!(server.debuggee().steps(), 1);
    }

    #[test]
    fn test_memory_reply_size() {
        let wire = Command::ReadMemory { addr: 0x7, len: 0x10 }.to_wire();
        let (_, out) = run(&wire);
        let frame = rspdiff_proto::Frame::parse(&out).unwrap();
        assert_eq!(frame.payload.len(), 2 * 0x10);
        assert!(frame.payload.iter().all(|&c| c == b'7'));
    }

    #[test]
    fn test_memory_read_zero_length() {
        let (_, out) = run(&Command::ReadMemory { addr: 0, len: 0 }.to_wire());
        assert_eq!(out, b"+$#00");
    }

    #[test]
    fn test_memory_read_limit() {
        let config = ServerConfig::default().with_max_memory_read(4);
        let (_, out) = run_with(config, &Command::ReadMemory { addr: 0, len: 5 }.to_wire());
        let mut expected = vec![ACK];
        expected.extend(Reply::Error(ERR_TOO_LARGE).to_packet());
        assert_eq!(out, expected);
    }

    #[test]
    fn test_malformed_memory_read() {
        let mut input = vec![b'+'];
        input.extend(packet::encode(b"m12"));
        let (_, out) = run(&input);
        assert_eq!(out, b"+$E01#a6");
    }

    #[test]
    fn test_unsupported_command_replies_empty() {
        let mut input = vec![b'+'];
        input.extend(packet::encode(b"qSupported"));
        let (end, out) = run(&input);
        assert_eq!(end, SessionEnd::Closed);
        assert_eq!(out, b"+$#00");
    }

    #[test]
    fn test_unexpected_async_byte() {
        let (end, out) = run(b"+$?#3f\x03$?#3f");
        assert_eq!(end, SessionEnd::UnexpectedByte(0x03));
        assert_eq!(out, b"+$S05#b8");
    }

    #[test]
    fn test_closed_mid_packet() {
        let (end, out) = run(b"+$?#3");
        assert_eq!(end, SessionEnd::Closed);
        assert!(out.is_empty());
    }

    #[test]
    fn test_checksum_ignored_by_default() {
        let (_, out) = run(b"$?#00");
        assert_eq!(out, b"+$S05#b8");
    }

    #[test]
    fn test_session_records_metrics() {
        let recorder = metrics::CliRecorder::new();
        let handle = recorder.handle();

        let config = ServerConfig::default().with_verify_checksums(true);
        let (end, _) = ::metrics::with_local_recorder(&recorder, || {
            run_with(config, b"+$?#3f+$?#3f+$s#73$g#00+$k#6b")
        });

        assert_eq!(end, SessionEnd::Killed);
        assert_eq!(handle.get_counter("rspdiff_packets_total"), Some(5));
        assert_eq!(
            handle.get_counter("rspdiff_commands_total{command=status}"),
            Some(2)
        );
        assert_eq!(handle.get_counter("rspdiff_commands_total{command=step}"), Some(1));
        assert_eq!(handle.get_counter("rspdiff_commands_total{command=kill}"), Some(1));
        assert_eq!(handle.get_counter("rspdiff_commands_total{command=read_registers}"), None);
        assert_eq!(handle.get_counter("rspdiff_checksum_failures_total"), Some(1));
    }

    #[test]
    fn test_checksum_verified_when_enabled() {
        let config = ServerConfig::default().with_verify_checksums(true);
        let (_, out) = run_with(config, b"$?#00$?#3f");
        assert_eq!(out, b"-+$S05#b8");
    }
}
