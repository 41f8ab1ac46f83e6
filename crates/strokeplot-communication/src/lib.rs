//! # strokeplot Communication
//!
//! Transports and the streaming protocol used to drive a pen plotter.
//! Supports Serial/USB ports and an in-memory simulated controller, and
//! classifies GRBL-style replies.

pub mod communication;
pub mod firmware;

pub use communication::{
    serial::{find_default_port, list_ports, LineBuffer, SerialPortInfo, SerialTransport},
    simulator::{SimulatedController, SimulatorHandle},
    streamer::{
        CancelToken, SerialStreamer, StreamListener, StreamReport, StreamerConfig, StreamerState,
    },
    ConnectionParams, SerialParity, Transport,
};

pub use firmware::Reply;
