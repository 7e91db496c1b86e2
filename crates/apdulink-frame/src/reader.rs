use bytes::{Bytes, BytesMut};
use tracing::{trace, warn};

use crate::codec::PacketConfig;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// How a [`ResponseAssembler`] decides that a response is complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Reassembly {
    /// Per-packet continuation heuristic of [`crate::unwrap_response`].
    ///
    /// Wire-compatible with existing host software. Trailing zero bytes of
    /// every packet are stripped, and a response that fits one packet keeps
    /// waiting for a continuation (its length field is non-zero).
    #[default]
    Heuristic,
    /// Length bookkeeping: the first packet's field is the total response
    /// length, exactly that many payload bytes are collected and padding is
    /// cut by length instead of by value.
    DeclaredLength,
}

/// Outcome of feeding one inbound packet to a [`ResponseAssembler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    /// The packet belongs to this channel; its payload was appended.
    Accepted { more_expected: bool },
    /// Wrong channel, wrong tag or too short. Nothing was appended.
    Foreign,
}

/// Reassembles a response from inbound packets.
#[derive(Debug)]
pub struct ResponseAssembler {
    config: PacketConfig,
    mode: Reassembly,
    buf: BytesMut,
    declared_len: Option<u16>,
    packets: usize,
    complete: bool,
}

impl ResponseAssembler {
    /// Create an empty assembler using the continuation heuristic.
    pub fn new(config: PacketConfig) -> Self {
        Self::with_mode(config, Reassembly::default())
    }

    /// Create an empty assembler with an explicit completion mode.
    pub fn with_mode(config: PacketConfig, mode: Reassembly) -> Self {
        Self {
            config,
            mode,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            declared_len: None,
            packets: 0,
            complete: false,
        }
    }

    /// Feed one inbound packet.
    pub fn push(&mut self, packet: &[u8]) -> Push {
        let Some(fragment) = self.config.unwrap(packet) else {
            return Push::Foreign;
        };

        let first = self.packets == 0;
        if first {
            self.declared_len = Some(fragment.marker);
        }
        self.packets += 1;

        let more_expected = match self.mode {
            Reassembly::Heuristic => {
                self.buf.extend_from_slice(fragment.payload);
                fragment.more_expected
            }
            Reassembly::DeclaredLength => {
                let declared = usize::from(self.declared_len.unwrap_or_default());
                if !first && usize::from(fragment.marker) != self.packets - 2 {
                    warn!(
                        expected = self.packets - 2,
                        got = fragment.marker,
                        "out of sequence response packet"
                    );
                }
                let wanted = declared.saturating_sub(self.buf.len());
                let take = wanted.min(fragment.raw.len());
                self.buf.extend_from_slice(&fragment.raw[..take]);
                self.buf.len() < declared
            }
        };
        self.complete = !more_expected;

        trace!(
            marker = fragment.marker,
            total = self.buf.len(),
            more_expected,
            "response packet accepted"
        );

        Push::Accepted { more_expected }
    }

    /// True once the response is complete under the configured mode.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Number of accepted packets.
    pub fn packets(&self) -> usize {
        self.packets
    }

    /// Length field of the first accepted packet.
    pub fn declared_len(&self) -> Option<u16> {
        self.declared_len
    }

    /// Completion mode in use.
    pub fn mode(&self) -> Reassembly {
        self.mode
    }

    /// Take the accumulated response.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
