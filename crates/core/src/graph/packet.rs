use std::time::{SystemTime, UNIX_EPOCH};

use crate::detection::domain::detection::Detection;
use crate::shared::frame::Frame;

/// Packet timestamp in microseconds.
///
/// The graph requires timestamps on an input stream to be strictly
/// increasing; equal or earlier timestamps are rejected at submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn micros(self) -> i64 {
        self.0
    }
}

/// Produces strictly increasing timestamps from the system clock.
///
/// If the clock has not advanced since the previous call (or stepped
/// backwards), the timestamp is bumped by one microsecond instead.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_us: i64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> Timestamp {
        let now_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        self.last_us = now_us.max(self.last_us + 1);
        Timestamp(self.last_us)
    }
}

/// What a packet carries between graph nodes.
#[derive(Clone, Debug)]
pub enum PacketPayload {
    Image(Frame),
    Detections(Vec<Detection>),
}

/// A timestamped unit of data flowing through the graph.
#[derive(Clone, Debug)]
pub struct Packet {
    pub payload: PacketPayload,
    pub timestamp: Timestamp,
}

impl Packet {
    pub fn image(frame: Frame, timestamp: Timestamp) -> Self {
        Self {
            payload: PacketPayload::Image(frame),
            timestamp,
        }
    }

    pub fn detections(detections: Vec<Detection>, timestamp: Timestamp) -> Self {
        Self {
            payload: PacketPayload::Detections(detections),
            timestamp,
        }
    }
}
