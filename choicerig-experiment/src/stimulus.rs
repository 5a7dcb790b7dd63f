use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::{Arc, Mutex, PoisonError};

use choicerig_core::{Result, StimulusMessage};
use tracing::warn;

/// One-way link to the stimulus renderer. Sends never block on or wait
/// for the renderer and never fail the trial.
pub trait StimulusChannel {
    fn send(&mut self, message: &StimulusMessage);
}

/// Drops every message; for sessions without a renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStimulusChannel;

impl StimulusChannel for NullStimulusChannel {
    fn send(&mut self, _message: &StimulusMessage) {}
}

/// Sends each message as one JSON datagram.
#[derive(Debug)]
pub struct UdpStimulusChannel {
    socket: UdpSocket,
}

impl UdpStimulusChannel {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect(addr)?;
        Ok(Self { socket })
    }
}

impl StimulusChannel for UdpStimulusChannel {
    fn send(&mut self, message: &StimulusMessage) {
        let payload = match serde_json::to_vec(message) {
            Ok(p) => p,
            Err(e) => {
                warn!("stimulus message not encoded: {e}");
                return;
            }
        };
        if let Err(e) = self.socket.send(&payload) {
            warn!("stimulus datagram dropped: {e}");
        }
    }
}

/// Keeps every message; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingStimulusChannel {
    sent: Arc<Mutex<Vec<StimulusMessage>>>,
}

impl RecordingStimulusChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<StimulusMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StimulusChannel for RecordingStimulusChannel {
    fn send(&mut self, message: &StimulusMessage) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn message() -> StimulusMessage {
        StimulusMessage::default()
    }

    #[test]
    fn recording_clones_share_messages() {
        let recorder = RecordingStimulusChannel::new();
        let mut handle = recorder.clone();
        handle.send(&message());
        handle.send(&message());
        assert_eq!(recorder.messages().len(), 2);
    }

    #[test]
    fn udp_datagram_is_json() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut channel = UdpStimulusChannel::connect(receiver.local_addr().unwrap()).unwrap();
        channel.send(&message());
        let mut buf = [0u8; 1024];
        let n = receiver.recv(&mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert!(value.is_object());
    }
}
