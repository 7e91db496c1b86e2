use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use apdulink_frame::{wrap_command, Reassembly, DEFAULT_CHANNEL};
use apdulink_session::{Session, SessionConfig, SessionError, SessionState};
use apdulink_transport::{RawChannel, Result as TransportResult, TransportError};
use crossbeam_channel::{Receiver, Sender};

const GET_VERSION: [u8; 5] = [0xE0, 0x01, 0x00, 0x00, 0x00];

/// Gap between response packets so the single-slot handoff is drained in time.
const PACE: Duration = Duration::from_millis(30);

/// Device double: every written packet releases the next scripted reply
/// (a list of raw packets) onto the read side.
struct ScriptedDevice {
    replies: Mutex<VecDeque<Vec<Vec<u8>>>>,
    written: Mutex<Vec<Vec<u8>>>,
    feed_tx: Mutex<Option<Sender<Vec<u8>>>>,
    feed_rx: Receiver<Vec<u8>>,
    fail_writes: bool,
    readers: Mutex<HashSet<ThreadId>>,
}

impl ScriptedDevice {
    fn new(replies: Vec<Vec<Vec<u8>>>) -> Arc<Self> {
        Self::build(replies, false)
    }

    fn failing_writes() -> Arc<Self> {
        Self::build(Vec::new(), true)
    }

    fn build(replies: Vec<Vec<Vec<u8>>>, fail_writes: bool) -> Arc<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            written: Mutex::default(),
            feed_tx: Mutex::new(Some(tx)),
            feed_rx: rx,
            fail_writes,
            readers: Mutex::default(),
        })
    }

    fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    fn reader_threads(&self) -> usize {
        self.readers.lock().unwrap().len()
    }
}

impl RawChannel for ScriptedDevice {
    fn write(&self, buf: &[u8]) -> TransportResult<usize> {
        if self.fail_writes {
            return Err(TransportError::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )));
        }
        self.written.lock().unwrap().push(buf.to_vec());
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            if let Some(tx) = self.feed_tx.lock().unwrap().as_ref() {
                for packet in reply {
                    tx.send(packet).unwrap();
                }
            }
        }
        Ok(buf.len())
    }

    fn read(&self, buf: &mut [u8]) -> TransportResult<usize> {
        self.readers.lock().unwrap().insert(thread::current().id());
        let packet = self.feed_rx.recv().map_err(|_| TransportError::Closed)?;
        thread::sleep(PACE);
        buf[..packet.len()].copy_from_slice(&packet);
        Ok(packet.len())
    }

    fn close(&self) -> TransportResult<()> {
        self.feed_tx.lock().unwrap().take();
        Ok(())
    }
}

fn packet(channel: u16, field: u16, payload: &[u8]) -> Vec<u8> {
    let mut p = channel.to_be_bytes().to_vec();
    p.push(0x05);
    p.extend_from_slice(&field.to_be_bytes());
    p.extend_from_slice(payload);
    p.resize(64, 0);
    p
}

fn session(device: &Arc<ScriptedDevice>, config: SessionConfig) -> Session {
    Session::from_channel(device.clone(), config).unwrap()
}

fn quick(timeout: Duration) -> SessionConfig {
    SessionConfig {
        exchange_timeout: timeout,
        ..SessionConfig::default()
    }
}

#[test]
fn two_packet_response_is_reassembled() {
    let device = ScriptedDevice::new(vec![vec![
        packet(DEFAULT_CHANNEL, 4, &[0x01, 0x02]),
        packet(DEFAULT_CHANNEL, 0, &[0x03, 0x04]),
    ]]);
    let session = session(&device, SessionConfig::default());

    let response = session.exchange(&GET_VERSION).unwrap();
    assert_eq!(response.as_ref(), &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(session.state(), SessionState::Open);

    let written = device.written();
    assert_eq!(written.len(), 1);
    assert_eq!(&written[0][..10], &[0x01, 0x01, 0x05, 0x00, 0x05, 0xE0, 0x01, 0x00, 0x00, 0x00]);
    assert!(written[0][10..].iter().all(|&b| b == 0));
}

#[test]
fn multi_packet_command_is_written_in_order() {
    let device = ScriptedDevice::new(vec![vec![packet(DEFAULT_CHANNEL, 0, &[0x90, 0x01])]]);
    let session = session(&device, SessionConfig::default());
    let command: Vec<u8> = (0..150u8).collect();

    session.exchange(&command).unwrap();

    let expected = wrap_command(DEFAULT_CHANNEL, &command, 64).unwrap();
    let written = device.written();
    assert_eq!(written.len(), 3);
    for (got, want) in written.iter().zip(&expected) {
        assert_eq!(got.as_slice(), want.as_ref());
    }
}

#[test]
fn declared_length_keeps_status_word() {
    let reply = wrap_command(DEFAULT_CHANNEL, &[0x31, 0x00, 0x90, 0x00], 64).unwrap();
    let device = ScriptedDevice::new(vec![reply.iter().map(|p| p.to_vec()).collect()]);
    let config = SessionConfig {
        reassembly: Reassembly::DeclaredLength,
        ..SessionConfig::default()
    };
    let session = session(&device, config);

    let response = session.exchange(&GET_VERSION).unwrap();
    assert_eq!(response.as_ref(), &[0x31, 0x00, 0x90, 0x00]);
}

#[test]
fn declared_length_spans_packets() {
    let body: Vec<u8> = (1..=120u8).chain([0x90, 0x00]).collect();
    let reply = wrap_command(DEFAULT_CHANNEL, &body, 64).unwrap();
    assert_eq!(reply.len(), 3);
    let device = ScriptedDevice::new(vec![reply.iter().map(|p| p.to_vec()).collect()]);
    let config = SessionConfig {
        reassembly: Reassembly::DeclaredLength,
        ..SessionConfig::default()
    };
    let session = session(&device, config);

    let response = session.exchange(&GET_VERSION).unwrap();
    assert_eq!(response.as_ref(), body.as_slice());
}

#[test]
fn silent_device_times_out_and_session_stays_open() {
    let device = ScriptedDevice::new(Vec::new());
    let session = session(&device, quick(Duration::from_millis(150)));

    let started = Instant::now();
    let err = session.exchange(&GET_VERSION).unwrap_err();
    assert!(matches!(err, SessionError::ExchangeTimeout(t) if t == Duration::from_millis(150)));
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(session.state(), SessionState::Open);
}

#[test]
fn single_packet_response_under_heuristic_times_out() {
    let reply = wrap_command(DEFAULT_CHANNEL, &[0x6A, 0x82], 64).unwrap();
    let device = ScriptedDevice::new(vec![reply.iter().map(|p| p.to_vec()).collect()]);
    let session = session(&device, quick(Duration::from_millis(200)));

    let err = session.exchange(&GET_VERSION).unwrap_err();
    assert!(matches!(err, SessionError::ExchangeTimeout(_)));
}

#[test]
fn one_byte_response_is_too_short() {
    let device = ScriptedDevice::new(vec![vec![packet(DEFAULT_CHANNEL, 0, &[0x90])]]);
    let session = session(&device, SessionConfig::default());

    let err = session.exchange(&GET_VERSION).unwrap_err();
    assert!(matches!(err, SessionError::ResponseTooShort { len: 1 }));
    assert_eq!(session.state(), SessionState::Open);
}

#[test]
fn short_command_is_rejected_before_any_write() {
    let device = ScriptedDevice::new(Vec::new());
    let session = session(&device, SessionConfig::default());

    let err = session.exchange(&[0xE0, 0x01]).unwrap_err();
    assert!(matches!(err, SessionError::InvalidCommand { len: 2, min: 5 }));
    assert!(device.written().is_empty());
}

#[test]
fn write_failure_returns_session_to_open() {
    let device = ScriptedDevice::failing_writes();
    let session = session(&device, SessionConfig::default());

    let err = session.exchange(&GET_VERSION).unwrap_err();
    assert!(matches!(
        err,
        SessionError::TransportWriteFailed(TransportError::Io(_))
    ));
    assert_eq!(session.state(), SessionState::Open);
}

#[test]
fn foreign_packets_are_skipped() {
    let device = ScriptedDevice::new(vec![vec![
        packet(0x0202, 0, &[0xAA, 0xBB]),
        packet(DEFAULT_CHANNEL, 0, &[0x01, 0x02]),
    ]]);
    let session = session(&device, SessionConfig::default());

    let response = session.exchange(&GET_VERSION).unwrap();
    assert_eq!(response.as_ref(), &[0x01, 0x02]);
}

#[test]
fn stale_packet_is_discarded_before_next_exchange() {
    let device = ScriptedDevice::new(vec![
        vec![
            packet(DEFAULT_CHANNEL, 0, &[0x01, 0x02]),
            packet(DEFAULT_CHANNEL, 0, &[0xDE, 0xAD]),
        ],
        vec![packet(DEFAULT_CHANNEL, 0, &[0x03, 0x04])],
    ]);
    let session = session(&device, SessionConfig::default());

    assert_eq!(session.exchange(&GET_VERSION).unwrap().as_ref(), &[0x01, 0x02]);
    // Let the unsolicited packet land in the handoff.
    thread::sleep(PACE * 4);
    assert_eq!(session.exchange(&GET_VERSION).unwrap().as_ref(), &[0x03, 0x04]);
}

#[test]
fn reader_is_started_once() {
    let replies = (0..3)
        .map(|i| vec![packet(DEFAULT_CHANNEL, 0, &[0x90, i + 1])])
        .collect();
    let device = ScriptedDevice::new(replies);
    let session = session(&device, SessionConfig::default());

    for i in 0..3u8 {
        assert_eq!(session.exchange(&GET_VERSION).unwrap().as_ref(), &[0x90, i + 1]);
    }
    assert_eq!(device.reader_threads(), 1);
}

#[test]
fn concurrent_exchange_is_busy() {
    let device = ScriptedDevice::new(Vec::new());
    let session = session(&device, quick(Duration::from_secs(10)));

    thread::scope(|scope| {
        let first = scope.spawn(|| session.exchange(&GET_VERSION));

        let deadline = Instant::now() + Duration::from_secs(5);
        while session.state() != SessionState::Exchanging {
            assert!(Instant::now() < deadline, "first exchange never started");
            thread::sleep(Duration::from_millis(5));
        }

        let err = session.exchange(&GET_VERSION).unwrap_err();
        assert!(matches!(err, SessionError::Busy));

        // Closing stops the reader, which ends the first exchange.
        session.close().unwrap();
        let err = first.join().unwrap().unwrap_err();
        assert!(matches!(err, SessionError::ReadChannelClosed));
    });

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(device.written().len(), 1);
}

#[test]
fn reader_failure_closes_session() {
    let device = ScriptedDevice::new(Vec::new());
    device.close().unwrap();
    let session = session(&device, SessionConfig::default());

    let err = session.exchange(&GET_VERSION).unwrap_err();
    assert!(matches!(err, SessionError::ReadChannelClosed));
    assert_eq!(session.state(), SessionState::Closed);

    let err = session.exchange(&GET_VERSION).unwrap_err();
    assert!(matches!(err, SessionError::Closed));
}

#[test]
fn exchange_after_close_fails() {
    let device = ScriptedDevice::new(vec![vec![packet(DEFAULT_CHANNEL, 0, &[0x90, 0x01])]]);
    let session = session(&device, SessionConfig::default());

    session.close().unwrap();
    session.close().unwrap();

    let err = session.exchange(&GET_VERSION).unwrap_err();
    assert!(matches!(err, SessionError::Closed));
    assert!(device.written().is_empty());
}
