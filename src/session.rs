//! Session orchestration: one control connection, at most one data connection.
//!
//! States, in order:
//! Idle -> ControlConnecting -> Handshaking -> (Rejected | DataListening)
//!      -> DataTransferring -> Acknowledging -> Draining -> Closed
//!
//! Every blocking socket call below is a suspension point with no timeout.
//! Transport faults end the session immediately; protocol and local policy
//! faults on the data connection are recorded and the session still
//! acknowledges and drains.
//!
//! The control connection has no resynchronisation point: once a frame on it
//! fails to decode (for example a length below the header size), nothing after
//! it can be framed. Any error while handshaking or draining therefore ends the
//! session in that phase, even one that `FtError::is_fatal` calls recoverable.

use crate::control::{ControlChannel, HandshakeOutcome};
use crate::data::{DataChannel, DataListener, FileReceipt, TcpDataListener};
use crate::error::{FtError, Phase, SessionError};
use crate::logger::Logger;
use crate::protocol::tag;
use std::io::{Read, Write};
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    List,
    Get(String),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::List => "list",
            Command::Get(_) => "get",
        }
    }

    pub fn filename(&self) -> Option<&str> {
        match self {
            Command::List => None,
            Command::Get(name) => Some(name),
        }
    }
}

/// Everything a session needs, fixed at startup.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub host: String,
    pub control_port: u16,
    pub data_port: u16,
    pub command: Command,
    /// Where received files are created.
    pub dest_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    ControlConnecting,
    Handshaking,
    Rejected,
    DataListening,
    DataTransferring,
    Acknowledging,
    Draining,
    Closed,
}

#[derive(Debug)]
pub enum TransferOutcome {
    Listed(Vec<String>),
    Received(FileReceipt),
    /// Recoverable fault; the session still acknowledged and drained.
    Failed(FtError),
}

#[derive(Debug)]
pub struct SessionReport {
    /// Message from an ERROR reply to the command; the data phase was skipped.
    pub rejected: Option<String>,
    pub transfer: Option<TransferOutcome>,
    /// ERROR messages received while draining, in arrival order.
    pub server_errors: Vec<String>,
    pub acks_sent: u32,
    /// States visited, in order.
    pub trail: Vec<State>,
}

impl SessionReport {
    fn new() -> Self {
        Self {
            rejected: None,
            transfer: None,
            server_errors: Vec::new(),
            acks_sent: 0,
            trail: vec![State::Idle],
        }
    }

    pub fn succeeded(&self) -> bool {
        self.rejected.is_none()
            && self.server_errors.is_empty()
            && matches!(
                self.transfer,
                Some(TransferOutcome::Listed(_)) | Some(TransferOutcome::Received(_))
            )
    }

    pub fn bytes_received(&self) -> u64 {
        match &self.transfer {
            Some(TransferOutcome::Received(r)) => r.bytes,
            _ => 0,
        }
    }

    pub fn listed(&self) -> &[String] {
        match &self.transfer {
            Some(TransferOutcome::Listed(names)) => names,
            _ => &[],
        }
    }
}

/// Connect to the server and run one full session over TCP.
pub fn run_session(
    config: &SessionConfig,
    logger: &dyn Logger,
) -> Result<SessionReport, SessionError> {
    let session = Session::new(config, logger);
    let control = ControlChannel::connect(&config.host, config.control_port)
        .map_err(|e| SessionError::new(Phase::Connect, e))?;
    logger.control_connected(&control.peer_addr());
    session.run(control, &mut TcpDataListener)
}

pub struct Session<'a> {
    config: &'a SessionConfig,
    logger: &'a dyn Logger,
    report: SessionReport,
}

impl<'a> Session<'a> {
    pub fn new(config: &'a SessionConfig, logger: &'a dyn Logger) -> Self {
        let mut report = SessionReport::new();
        report.trail.push(State::ControlConnecting);
        Self {
            config,
            logger,
            report,
        }
    }

    fn enter(&mut self, state: State) {
        self.report.trail.push(state);
    }

    /// Drive an already-connected control channel through the rest of the session.
    /// Both channels are closed on every return path.
    pub fn run<S, L>(
        mut self,
        mut control: ControlChannel<S>,
        listener: &mut L,
    ) -> Result<SessionReport, SessionError>
    where
        S: Read + Write,
        L: DataListener,
    {
        self.enter(State::Handshaking);
        let handshake = |e| SessionError::new(Phase::Handshake, e);
        control
            .send_command(&self.config.command, self.config.data_port)
            .map_err(handshake)?;
        match control.await_handshake_reply().map_err(handshake)? {
            HandshakeOutcome::Rejected(msg) => {
                self.enter(State::Rejected);
                self.logger.handshake_rejected(&msg);
                self.report.rejected = Some(msg);
                self.enter(State::Closed);
                self.logger.closed(false);
                return Ok(self.report);
            }
            HandshakeOutcome::Accepted(reply) => self.logger.handshake_accepted(&reply),
        }

        self.enter(State::DataListening);
        let (mut data, peer) = listener
            .accept_one(self.config.data_port)
            .map_err(|e| SessionError::new(Phase::DataSetup, e))?;
        self.logger.data_connected(&peer);

        self.enter(State::DataTransferring);
        let outcome = match self.transfer(&mut data) {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => return Err(SessionError::new(Phase::DataTransfer, e)),
            Err(e) => {
                self.logger.transfer_failed(&e.to_string());
                TransferOutcome::Failed(e)
            }
        };
        let data = if matches!(outcome, TransferOutcome::Failed(_)) {
            // Abandon the data connection before acknowledging. A server still
            // streaming a refused file sees the close instead of blocking on a
            // full socket buffer.
            drop(data);
            None
        } else {
            Some(data)
        };
        self.report.transfer = Some(outcome);

        // Acknowledge no matter how the transfer went.
        self.enter(State::Acknowledging);
        control
            .send_ack()
            .map_err(|e| SessionError::new(Phase::Acknowledge, e))?;
        self.report.acks_sent += 1;

        self.enter(State::Draining);
        for msg in control.drain_until_close() {
            let msg = msg.map_err(|e| SessionError::new(Phase::Drain, e))?;
            self.logger.server_error(&msg);
            self.report.server_errors.push(msg);
        }

        drop(data);
        drop(control);
        self.enter(State::Closed);
        self.logger.closed(self.report.succeeded());
        Ok(self.report)
    }

    fn transfer<D: Read>(&self, data: &mut DataChannel<D>) -> Result<TransferOutcome, FtError> {
        let first = data.next_frame()?;
        if first.is(tag::FNAME) {
            self.logger.listing_started();
            let mut names = Vec::new();
            for name in data.consume_listing(first) {
                let name = name?;
                self.logger.listing_entry(&name);
                names.push(name);
            }
            Ok(TransferOutcome::Listed(names))
        } else if first.is(tag::FILE) {
            self.logger.file_started(&first.text());
            let logger = self.logger;
            let receipt =
                data.consume_file(first, &self.config.dest_dir, |b| logger.file_progress(b))?;
            self.logger.file_done(&receipt.path, receipt.bytes);
            Ok(TransferOutcome::Received(receipt))
        } else {
            Err(FtError::UnexpectedTag {
                expected: "FNAME or FILE",
                found: first.tag,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NoopLogger;
    use crate::protocol_core::{encode, Frame};
    use crate::test_util::{DropFlag, Duplex, WriteMark};
    use std::io::Cursor;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn wire(frames: &[(&str, &[u8])]) -> Vec<u8> {
        frames
            .iter()
            .flat_map(|(t, p)| encode(t, p).unwrap())
            .collect()
    }

    /// Hands out a scripted data stream and counts how often it was asked.
    /// `closed` goes up once the session drops that stream.
    struct Scripted {
        data: Option<Vec<u8>>,
        accepts: u32,
        closed: Arc<AtomicBool>,
    }

    impl DataListener for Scripted {
        type Stream = DropFlag<Cursor<Vec<u8>>>;

        fn accept_one(
            &mut self,
            _port: u16,
        ) -> crate::error::Result<(DataChannel<Self::Stream>, String)> {
            self.accepts += 1;
            let bytes = self.data.take().unwrap_or_default();
            let stream = DropFlag::new(Cursor::new(bytes), self.closed.clone());
            Ok((DataChannel::new(stream), "scripted".into()))
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        config: SessionConfig,
    }

    fn fixture(command: Command) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            host: "localhost".into(),
            control_port: 30020,
            data_port: 30021,
            command,
            dest_dir: dir.path().to_path_buf(),
        };
        Fixture { dir, config }
    }

    struct Traced {
        result: Result<SessionReport, SessionError>,
        sent: Vec<Frame>,
        /// One per sent frame; `flagged` means the data stream was already closed.
        marks: Vec<WriteMark>,
        accepts: u32,
    }

    fn run_traced(fx: &Fixture, control_in: Vec<u8>, data_in: Vec<u8>) -> Traced {
        let logger = NoopLogger;
        let closed = Arc::new(AtomicBool::new(false));
        let mut listener = Scripted {
            data: Some(data_in),
            accepts: 0,
            closed: closed.clone(),
        };
        let mut duplex = Duplex::new(control_in).watching(closed);
        let result =
            Session::new(&fx.config, &logger).run(ControlChannel::new(&mut duplex), &mut listener);
        Traced {
            result,
            sent: duplex.written_frames(),
            marks: duplex.marks().to_vec(),
            accepts: listener.accepts,
        }
    }

    fn run(
        fx: &Fixture,
        control_in: Vec<u8>,
        data_in: Vec<u8>,
    ) -> (Result<SessionReport, SessionError>, Vec<Frame>, u32) {
        let t = run_traced(fx, control_in, data_in);
        (t.result, t.sent, t.accepts)
    }

    /// Where the control script stood when the ACK went out.
    fn ack_mark(t: &Traced) -> WriteMark {
        let at = t.sent.iter().position(|f| f.is("ACK")).expect("an ACK was sent");
        t.marks[at]
    }

    fn acks(sent: &[Frame]) -> usize {
        sent.iter().filter(|f| f.is("ACK")).count()
    }

    #[test]
    fn listing_session_runs_every_state() {
        let fx = fixture(Command::List);
        let (report, sent, accepts) = run(
            &fx,
            wire(&[("OKAY", b""), ("CLOSE", b"")]),
            wire(&[("FNAME", b"a.txt"), ("FNAME", b"b.txt"), ("DONE", b"")]),
        );
        let report = report.unwrap();
        assert!(report.succeeded());
        assert_eq!(report.listed(), ["a.txt", "b.txt"]);
        assert_eq!(accepts, 1);
        assert_eq!(
            sent.iter().map(|f| f.tag.as_str()).collect::<Vec<_>>(),
            vec!["DPORT", "LIST", "ACK"]
        );
        assert_eq!(
            report.trail,
            vec![
                State::Idle,
                State::ControlConnecting,
                State::Handshaking,
                State::DataListening,
                State::DataTransferring,
                State::Acknowledging,
                State::Draining,
                State::Closed,
            ]
        );
    }

    #[test]
    fn rejection_skips_data_phase() {
        let fx = fixture(Command::Get("missing.txt".into()));
        let (report, sent, accepts) = run(&fx, wire(&[("ERROR", b"no such file")]), Vec::new());
        let report = report.unwrap();
        assert_eq!(report.rejected.as_deref(), Some("no such file"));
        assert_eq!(accepts, 0);
        assert_eq!(acks(&sent), 0);
        assert!(!report.trail.contains(&State::DataListening));
        assert_eq!(report.trail.last(), Some(&State::Closed));
        assert!(!report.succeeded());
    }

    #[test]
    fn file_session_writes_destination() {
        let fx = fixture(Command::Get("out.txt".into()));
        let (report, _, _) = run(
            &fx,
            wire(&[("OKAY", b""), ("CLOSE", b"")]),
            wire(&[("FILE", b"out.txt"), ("DATA", b"hello "), ("DONE", b"world")]),
        );
        let report = report.unwrap();
        assert!(report.succeeded());
        assert_eq!(report.bytes_received(), 11);
        assert_eq!(std::fs::read(fx.dir.path().join("out.txt")).unwrap(), b"hello world");
    }

    #[test]
    fn always_acknowledges_exactly_once() {
        let control = || wire(&[("OKAY", b""), ("ERROR", b"late"), ("CLOSE", b"")]);
        let reply_len = wire(&[("OKAY", b"")]).len() as u64;
        let check = |t: &Traced| {
            assert_eq!(acks(&t.sent), 1);
            // Sent after the handshake reply and before any drain frame was read.
            assert_eq!(ack_mark(t).consumed, reply_len);
            let report = t.result.as_ref().unwrap();
            assert_eq!(report.server_errors, vec!["late"]);
        };

        // success
        let fx = fixture(Command::Get("a.txt".into()));
        let t = run_traced(&fx, control(), wire(&[("FILE", b"a.txt"), ("DONE", b"")]));
        check(&t);
        assert!(matches!(
            t.result.unwrap().transfer,
            Some(TransferOutcome::Received(_))
        ));

        // destination exists
        let fx = fixture(Command::Get("a.txt".into()));
        std::fs::write(fx.dir.path().join("a.txt"), b"keep").unwrap();
        let t = run_traced(
            &fx,
            control(),
            wire(&[("FILE", b"a.txt"), ("X", b"new"), ("DONE", b"")]),
        );
        check(&t);
        assert!(matches!(
            t.result.unwrap().transfer,
            Some(TransferOutcome::Failed(FtError::DestinationExists(_)))
        ));
        assert_eq!(std::fs::read(fx.dir.path().join("a.txt")).unwrap(), b"keep");

        // unexpected first tag
        let fx = fixture(Command::List);
        let t = run_traced(&fx, control(), wire(&[("DONE", b"")]));
        check(&t);
        assert!(matches!(
            t.result.unwrap().transfer,
            Some(TransferOutcome::Failed(FtError::UnexpectedTag { .. }))
        ));

        // stray tag inside a listing
        let fx = fixture(Command::List);
        let t = run_traced(&fx, control(), wire(&[("FNAME", b"a"), ("BOGUS", b"")]));
        check(&t);
        assert!(matches!(
            t.result.unwrap().transfer,
            Some(TransferOutcome::Failed(FtError::MalformedStream(_)))
        ));
    }

    #[test]
    fn refused_file_closes_data_connection_before_ack() {
        let fx = fixture(Command::Get("big.bin".into()));
        std::fs::write(fx.dir.path().join("big.bin"), b"keep").unwrap();
        let t = run_traced(
            &fx,
            wire(&[("OKAY", b""), ("CLOSE", b"")]),
            wire(&[("FILE", b"big.bin"), ("FILE", &[7u8; 512]), ("DONE", b"")]),
        );
        assert!(ack_mark(&t).flagged);
        assert!(matches!(
            t.result.unwrap().transfer,
            Some(TransferOutcome::Failed(FtError::DestinationExists(_)))
        ));

        let fx = fixture(Command::Get("../up.bin".into()));
        let t = run_traced(
            &fx,
            wire(&[("OKAY", b""), ("CLOSE", b"")]),
            wire(&[("FILE", b"../up.bin"), ("DONE", b"")]),
        );
        assert!(ack_mark(&t).flagged);
        assert!(matches!(
            t.result.unwrap().transfer,
            Some(TransferOutcome::Failed(FtError::UnsafeDestination(_)))
        ));
    }

    #[test]
    fn completed_transfer_keeps_data_connection_until_closed() {
        let fx = fixture(Command::List);
        let t = run_traced(
            &fx,
            wire(&[("OKAY", b""), ("CLOSE", b"")]),
            wire(&[("FNAME", b"a.txt"), ("DONE", b"")]),
        );
        assert!(!ack_mark(&t).flagged);
        assert!(t.result.unwrap().succeeded());
    }

    #[test]
    fn drain_collects_server_errors() {
        let fx = fixture(Command::List);
        let (report, _, _) = run(
            &fx,
            wire(&[
                ("OKAY", b""),
                ("ERROR", b"disk full"),
                ("ERROR", b"retry later"),
                ("CLOSE", b""),
            ]),
            wire(&[("DONE", b"")]),
        );
        let report = report.unwrap();
        assert_eq!(report.server_errors, vec!["disk full", "retry later"]);
        assert!(!report.succeeded());
    }

    #[test]
    fn data_eof_is_fatal_and_skips_ack() {
        let fx = fixture(Command::Get("a.txt".into()));
        let (r, sent, _) = run(
            &fx,
            wire(&[("OKAY", b""), ("CLOSE", b"")]),
            wire(&[("FILE", b"a.txt"), ("DATA", b"partial")]),
        );
        let err = r.unwrap_err();
        assert_eq!(err.phase, Phase::DataTransfer);
        assert!(matches!(err.source, FtError::ConnectionClosed));
        assert_eq!(acks(&sent), 0);
    }

    #[test]
    fn missing_close_is_drain_fault() {
        let fx = fixture(Command::List);
        let (r, _, _) = run(
            &fx,
            wire(&[("OKAY", b""), ("ERROR", b"late")]),
            wire(&[("DONE", b"")]),
        );
        let err = r.unwrap_err();
        assert_eq!(err.phase, Phase::Drain);
    }

    /// A control frame whose length is below the header size.
    fn short_frame(tag: &[u8; 8]) -> Vec<u8> {
        let mut bytes = vec![0x00, 0x04];
        bytes.extend_from_slice(tag);
        bytes
    }

    #[test]
    fn malformed_control_frame_ends_session_in_its_phase() {
        let fx = fixture(Command::List);
        let (r, sent, accepts) = run(&fx, short_frame(b"OKAY\0\0\0\0"), Vec::new());
        let err = r.unwrap_err();
        assert_eq!(err.phase, Phase::Handshake);
        assert!(matches!(err.source, FtError::MalformedStream(_)));
        assert_eq!(accepts, 0);
        assert_eq!(acks(&sent), 0);

        let fx = fixture(Command::List);
        let mut control = wire(&[("OKAY", b"")]);
        control.extend(short_frame(b"ERROR\0\0\0"));
        let (r, sent, _) = run(&fx, control, wire(&[("DONE", b"")]));
        let err = r.unwrap_err();
        assert_eq!(err.phase, Phase::Drain);
        assert!(matches!(err.source, FtError::MalformedStream(_)));
        assert_eq!(acks(&sent), 1);
    }

    #[test]
    fn handshake_eof_is_fatal() {
        let fx = fixture(Command::List);
        let (r, _, accepts) = run(&fx, Vec::new(), Vec::new());
        assert_eq!(r.unwrap_err().phase, Phase::Handshake);
        assert_eq!(accepts, 0);
    }
}
