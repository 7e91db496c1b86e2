//! Background reader feeding a session's single-slot handoff.
//!
//! One reader thread per session owns every read of the raw channel. Each
//! packet it reads is offered to the handoff with `try_send`: if the slot is
//! still occupied, the packet is dropped rather than queued. This is only
//! lossless when exchanges are strictly request/response and every exchange
//! drains its response before the next one begins.

use std::sync::Arc;
use std::thread;

use apdulink_transport::RawChannel;
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, error, trace, warn};

/// Packets the handoff holds while the exchange loop is busy.
pub(crate) const HANDOFF_CAPACITY: usize = 1;

/// Start the reader thread and return the consuming end of its handoff.
///
/// If the thread cannot be started the returned receiver is already
/// disconnected, which the exchange loop reports as a closed read channel.
pub(crate) fn spawn(channel: Arc<dyn RawChannel>, packet_size: usize) -> Receiver<Bytes> {
    let (tx, rx) = crossbeam_channel::bounded(HANDOFF_CAPACITY);

    let spawned = thread::Builder::new()
        .name("apdulink-reader".to_string())
        .spawn(move || read_loop(channel.as_ref(), packet_size, &tx));
    if let Err(err) = spawned {
        error!(%err, "failed to start background reader");
    }

    rx
}

fn read_loop(channel: &dyn RawChannel, packet_size: usize, tx: &Sender<Bytes>) {
    debug!(packet_size, "background reader started");
    loop {
        let mut buf = vec![0u8; packet_size];
        let read = match channel.read(&mut buf) {
            Ok(n) => n,
            Err(err) if err.is_interrupted() => continue,
            Err(err) => {
                debug!(%err, "background reader stopped");
                return;
            }
        };
        buf.truncate(read);

        match tx.try_send(Bytes::from(buf)) {
            Ok(()) => trace!(read, "packet handed off"),
            Err(TrySendError::Full(_)) => warn!(read, "handoff occupied; packet dropped"),
            Err(TrySendError::Disconnected(_)) => {
                debug!("session gone; background reader exiting");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use apdulink_transport::{Result as TransportResult, TransportError};
    use crossbeam_channel::RecvTimeoutError;

    use super::*;

    /// Yields one scripted read per gate token, then fails with `Closed`.
    struct Script {
        reads: Mutex<Vec<Vec<u8>>>,
        gate: crossbeam_channel::Receiver<()>,
        done: crossbeam_channel::Sender<()>,
    }

    impl Script {
        fn closed(&self) -> TransportResult<usize> {
            let _ = self.done.send(());
            Err(TransportError::Closed)
        }
    }

    impl RawChannel for Script {
        fn write(&self, buf: &[u8]) -> TransportResult<usize> {
            Ok(buf.len())
        }

        fn read(&self, buf: &mut [u8]) -> TransportResult<usize> {
            if self.gate.recv().is_err() {
                return self.closed();
            }
            let mut reads = self.reads.lock().unwrap();
            if reads.is_empty() {
                return self.closed();
            }
            let next = reads.remove(0);
            buf[..next.len()].copy_from_slice(&next);
            Ok(next.len())
        }

        fn close(&self) -> TransportResult<()> {
            Ok(())
        }
    }

    #[test]
    fn forwards_reads_in_order_then_disconnects() {
        let (gate_tx, gate) = crossbeam_channel::unbounded();
        let (done, _done_rx) = crossbeam_channel::unbounded();
        let channel = Arc::new(Script {
            reads: Mutex::new(vec![vec![1, 2, 3], vec![4, 5]]),
            gate,
            done,
        });
        let rx = spawn(channel, 64);

        gate_tx.send(()).unwrap();
        assert_eq!(rx.recv().unwrap().as_ref(), &[1, 2, 3]);
        gate_tx.send(()).unwrap();
        assert_eq!(rx.recv().unwrap().as_ref(), &[4, 5]);
        gate_tx.send(()).unwrap();
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn drops_packets_when_slot_is_occupied() {
        let (gate_tx, gate) = crossbeam_channel::unbounded();
        let (done, done_rx) = crossbeam_channel::unbounded();
        let channel = Arc::new(Script {
            reads: Mutex::new(vec![vec![1], vec![2], vec![3]]),
            gate,
            done,
        });
        let rx = spawn(channel, 8);

        // Release all three reads without consuming: only the first fits.
        for _ in 0..3 {
            gate_tx.send(()).unwrap();
        }
        drop(gate_tx);
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let received: Vec<Bytes> = rx.try_iter().collect();
        assert_eq!(received.len(), HANDOFF_CAPACITY);
        assert_eq!(received[0].as_ref(), &[1]);
    }
}
