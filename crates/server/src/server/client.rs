//! Loopback clients: receive frames in process and acknowledge them after
//! a fixed number of ticks.

use std::collections::VecDeque;

use bytes::Bytes;
use protocol::packets::{build_ack, read_frame};
use protocol::ProtocolError;

/// A simulated remote player.
#[derive(Debug)]
pub struct LoopbackClient {
    /// Player slot.
    pub slot: usize,
    /// Ticks between receiving a frame and acking it.
    pub latency_ticks: u64,
    /// Frames waiting to be acked, with the tick they are due.
    in_flight: VecDeque<(u64, Bytes)>,
    pub frames_received: u64,
    pub deltas_received: u64,
}

impl LoopbackClient {
    pub fn new(slot: usize, latency_ticks: u64) -> Self {
        Self {
            slot,
            latency_ticks,
            in_flight: VecDeque::new(),
            frames_received: 0,
            deltas_received: 0,
        }
    }

    /// Queues a frame received on `tick`.
    pub fn receive(&mut self, tick: u64, frame: Bytes) {
        self.in_flight.push_back((tick + self.latency_ticks, frame));
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Ack packets for every frame due by `tick`. A frame with a resend id
    /// is acked twice: once for its set and once for the resend.
    pub fn poll_acks(&mut self, tick: u64) -> Result<Vec<Bytes>, ProtocolError> {
        let mut acks = Vec::new();
        while self.in_flight.front().is_some_and(|(due, _)| *due <= tick) {
            let Some((_, frame)) = self.in_flight.pop_front() else {
                break;
            };
            let (header, records) = read_frame(frame)?;
            self.frames_received += 1;
            self.deltas_received += records.len() as u64;
            acks.push(build_ack(header.set, 0).finish());
            if header.resend != 0 {
                acks.push(build_ack(header.set, header.resend).finish());
            }
        }
        Ok(acks)
    }

    /// Forgets frames still in flight, as when the connection drops.
    pub fn reset(&mut self) {
        self.in_flight.clear();
    }
}
