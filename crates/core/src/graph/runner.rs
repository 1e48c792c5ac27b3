use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

use crate::graph::calculator::{Calculator, CalculatorRegistry};
use crate::graph::config::GraphConfig;
use crate::graph::packet::Packet;

const INPUT_CHANNEL_CAPACITY: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("no calculator registered under the name '{0}'")]
    UnknownCalculator(String),
    #[error("graph has no stream named '{0}'")]
    UnknownStream(String),
    #[error("timestamp {submitted}us is not after the previous packet at {last}us")]
    NonMonotonicTimestamp { last: i64, submitted: i64 },
    #[error("graph run has not been started")]
    NotStarted,
    #[error("graph run has already been started")]
    AlreadyStarted,
    #[error("output stream poller was already taken")]
    PollerAlreadyTaken,
    #[error("input stream is closed")]
    InputClosed,
    #[error("output stream is closed")]
    OutputClosed,
    #[error("no output packet before the deadline")]
    DeadlineExceeded,
    #[error("calculator failed: {0}")]
    Calculator(String),
    #[error("graph worker thread panicked")]
    WorkerPanicked,
}

/// Blocking consumer of the graph's output stream.
///
/// The graph emits exactly one output packet per input packet, in
/// submission order, so `next` pairs one-to-one with submissions.
pub struct OutputStreamPoller {
    rx: Receiver<Result<Packet, GraphError>>,
}

impl OutputStreamPoller {
    /// Blocks until the next output packet, without a deadline.
    pub fn next(&mut self) -> Result<Packet, GraphError> {
        self.rx.recv().map_err(|_| GraphError::OutputClosed)?
    }

    /// Blocks until the next output packet or the deadline, whichever
    /// comes first.
    pub fn next_deadline(&mut self, timeout: Duration) -> Result<Packet, GraphError> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(GraphError::DeadlineExceeded),
            Err(RecvTimeoutError::Disconnected) => Err(GraphError::OutputClosed),
        }
    }
}

/// A runnable chain of calculators between one named input stream and one
/// named output stream.
///
/// Lifecycle: `initialize` → `add_output_stream_poller` → `start_run` →
/// `add_packet_to_input_stream`* → `close_input_stream` →
/// `wait_until_done`. The graph is single-run: it cannot be restarted
/// after the worker exits.
pub struct CalculatorGraph {
    input_stream: String,
    output_stream: String,
    nodes: Option<Vec<Box<dyn Calculator>>>,
    output_tx: Option<Sender<Result<Packet, GraphError>>>,
    output_rx: Option<Receiver<Result<Packet, GraphError>>>,
    input_tx: Option<Sender<Packet>>,
    worker: Option<JoinHandle<Result<(), GraphError>>>,
    last_timestamp: Option<i64>,
}

impl CalculatorGraph {
    /// Builds every node named in the config. Unknown calculator names and
    /// factory failures (e.g. an unreadable model file) fail here.
    pub fn initialize(
        config: GraphConfig,
        registry: &CalculatorRegistry,
    ) -> Result<Self, GraphError> {
        let nodes = config
            .nodes
            .iter()
            .map(|node| registry.build(node))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!(
            "initialized graph: {} -> {} node(s) -> {}",
            config.input_stream,
            nodes.len(),
            config.output_stream
        );

        let (output_tx, output_rx) = bounded(INPUT_CHANNEL_CAPACITY);
        Ok(Self {
            input_stream: config.input_stream,
            output_stream: config.output_stream,
            nodes: Some(nodes),
            output_tx: Some(output_tx),
            output_rx: Some(output_rx),
            input_tx: None,
            worker: None,
            last_timestamp: None,
        })
    }

    /// Takes the single poller for the named output stream.
    ///
    /// Must be called before `start_run`; the graph supports exactly one
    /// poller.
    pub fn add_output_stream_poller(
        &mut self,
        stream: &str,
    ) -> Result<OutputStreamPoller, GraphError> {
        if stream != self.output_stream {
            return Err(GraphError::UnknownStream(stream.to_string()));
        }
        if self.worker.is_some() {
            return Err(GraphError::AlreadyStarted);
        }
        let rx = self
            .output_rx
            .take()
            .ok_or(GraphError::PollerAlreadyTaken)?;
        Ok(OutputStreamPoller { rx })
    }

    /// Spawns the worker thread that drives packets through the node chain.
    pub fn start_run(&mut self) -> Result<(), GraphError> {
        if self.worker.is_some() {
            return Err(GraphError::AlreadyStarted);
        }
        let mut nodes = self.nodes.take().ok_or(GraphError::AlreadyStarted)?;
        let output_tx = self.output_tx.take().ok_or(GraphError::AlreadyStarted)?;
        let (input_tx, input_rx) = bounded::<Packet>(INPUT_CHANNEL_CAPACITY);

        let handle = std::thread::spawn(move || -> Result<(), GraphError> {
            for packet in input_rx {
                match process_chain(&mut nodes, packet) {
                    Ok(out) => {
                        // A dropped poller just discards outputs
                        let _ = output_tx.send(Ok(out));
                    }
                    Err(err) => {
                        log::error!("graph worker stopping: {err}");
                        let _ = output_tx.send(Err(err.clone()));
                        return Err(err);
                    }
                }
            }
            Ok(())
        });

        self.input_tx = Some(input_tx);
        self.worker = Some(handle);
        Ok(())
    }

    /// Submits a packet to the named input stream.
    ///
    /// Timestamps must strictly increase across submissions. Blocks when
    /// the graph is busy (bounded input queue).
    pub fn add_packet_to_input_stream(
        &mut self,
        stream: &str,
        packet: Packet,
    ) -> Result<(), GraphError> {
        if stream != self.input_stream {
            return Err(GraphError::UnknownStream(stream.to_string()));
        }
        let tx = match (&self.input_tx, self.worker.is_some()) {
            (Some(tx), _) => tx,
            (None, true) => return Err(GraphError::InputClosed),
            (None, false) => return Err(GraphError::NotStarted),
        };

        let submitted = packet.timestamp.micros();
        if let Some(last) = self.last_timestamp {
            if submitted <= last {
                return Err(GraphError::NonMonotonicTimestamp { last, submitted });
            }
        }

        tx.send(packet).map_err(|_| GraphError::InputClosed)?;
        self.last_timestamp = Some(submitted);
        Ok(())
    }

    /// Closes the named input stream; the worker drains in-flight packets
    /// and exits. Closing an already-closed stream is a no-op.
    pub fn close_input_stream(&mut self, stream: &str) -> Result<(), GraphError> {
        if stream != self.input_stream {
            return Err(GraphError::UnknownStream(stream.to_string()));
        }
        self.input_tx = None;
        Ok(())
    }

    /// Blocks until the worker has processed all in-flight packets and
    /// exited, surfacing the first calculator error if there was one.
    ///
    /// Implies closing the input stream; returns immediately if the run
    /// was never started.
    pub fn wait_until_done(&mut self) -> Result<(), GraphError> {
        self.input_tx = None;
        match self.worker.take() {
            Some(handle) => handle.join().map_err(|_| GraphError::WorkerPanicked)?,
            None => Ok(()),
        }
    }

    pub fn input_stream(&self) -> &str {
        &self.input_stream
    }

    pub fn output_stream(&self) -> &str {
        &self.output_stream
    }
}

impl Drop for CalculatorGraph {
    fn drop(&mut self) {
        if let Err(err) = self.wait_until_done() {
            log::warn!("graph shut down with error: {err}");
        }
    }
}

fn process_chain(
    nodes: &mut [Box<dyn Calculator>],
    packet: Packet,
) -> Result<Packet, GraphError> {
    let mut current = packet;
    for node in nodes.iter_mut() {
        current = node
            .process(current)
            .map_err(|e| GraphError::Calculator(e.to_string()))?;
    }
    Ok(current)
}
