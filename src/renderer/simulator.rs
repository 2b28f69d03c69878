// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    io::{self, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{info, warn};

use super::{Sink, SinkError, SinkFrame};
use crate::playsync::Worker;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Streams frames to any number of simulator clients. Each frame is a 4-byte big-endian
/// length followed by the JSON encoded frame.
pub struct SimulatorSink {
    address: SocketAddr,
    clients: Arc<Mutex<Vec<(SocketAddr, TcpStream)>>>,
    _acceptor: Worker,
}

impl SimulatorSink {
    /// Starts listening on the given address.
    pub fn bind(address: SocketAddr) -> io::Result<SimulatorSink> {
        let listener = TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;
        let address = listener.local_addr()?;
        info!(%address, "Simulator sink listening.");

        let clients: Arc<Mutex<Vec<(SocketAddr, TcpStream)>>> = Arc::new(Mutex::new(Vec::new()));
        let acceptor = {
            let clients = clients.clone();
            Worker::spawn("simulator-accept", move |cancel_handle| loop {
                match listener.accept() {
                    Ok((stream, peer)) => match prepare(&stream) {
                        Ok(()) => {
                            info!(%peer, "Simulator client connected.");
                            clients.lock().push((peer, stream));
                        }
                        Err(e) => warn!(err = %e, %peer, "Unable to configure simulator client"),
                    },
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        if cancel_handle.wait_timeout(ACCEPT_POLL_INTERVAL) {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(err = %e, "Error accepting simulator client");
                        if cancel_handle.wait_timeout(ACCEPT_POLL_INTERVAL) {
                            return;
                        }
                    }
                }
            })?
        };

        Ok(SimulatorSink {
            address,
            clients,
            _acceptor: acceptor,
        })
    }

    /// The bound address. Useful when binding to port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}

fn prepare(stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))
}

/// Encodes a frame with its length prefix.
pub fn encode(frame: &SinkFrame) -> Result<Vec<u8>, SinkError> {
    let payload = serde_json::to_vec(frame)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame too large"))?;
    let mut message = Vec::with_capacity(payload.len() + 4);
    message.extend_from_slice(&len.to_be_bytes());
    message.extend_from_slice(&payload);
    Ok(message)
}

impl Sink for SimulatorSink {
    fn send(&self, frame: &SinkFrame) -> Result<(), SinkError> {
        let mut clients = self.clients.lock();
        if clients.is_empty() {
            return Ok(());
        }

        let message = encode(frame)?;
        clients.retain_mut(|(peer, stream)| match stream.write_all(&message) {
            Ok(()) => true,
            Err(e) => {
                info!(err = %e, %peer, "Simulator client disconnected.");
                false
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, io::Read};

    use super::*;
    use crate::color::Rgb;
    use crate::renderer::DebugElement;
    use crate::testutil::eventually;

    #[test]
    fn test_encode() -> Result<(), Box<dyn Error>> {
        let message = encode(&SinkFrame {
            leds: vec![Rgb::new(1, 2, 3)],
            debug_elements: vec![],
        })?;
        let payload = br#"{"leds":[[1,2,3]],"debug_elements":[]}"#;
        assert_eq!(&(payload.len() as u32).to_be_bytes(), &message[..4]);
        assert_eq!(&payload[..], &message[4..]);
        Ok(())
    }

    #[test]
    fn test_streams_to_client() -> Result<(), Box<dyn Error>> {
        let sink = SimulatorSink::bind("127.0.0.1:0".parse()?)?;
        let mut client = TcpStream::connect(sink.local_addr())?;
        eventually(|| sink.client_count() == 1, "client never accepted");

        let frame = SinkFrame {
            leds: vec![Rgb::RED, Rgb::BLACK],
            debug_elements: vec![DebugElement::Line {
                from: [0.0, 0.0, 0.0],
                to: [1.0, 1.0, 1.0],
                color: Rgb::WHITE,
            }],
        };
        sink.send(&frame)?;

        let mut len = [0u8; 4];
        client.read_exact(&mut len)?;
        let mut payload = vec![0u8; u32::from_be_bytes(len) as usize];
        client.read_exact(&mut payload)?;

        let decoded: serde_json::Value = serde_json::from_slice(&payload)?;
        assert_eq!(serde_json::json!([[255, 0, 0], [0, 0, 0]]), decoded["leds"]);
        assert_eq!("line", decoded["debug_elements"][0]["type"]);
        Ok(())
    }

    #[test]
    fn test_drops_disconnected_clients() -> Result<(), Box<dyn Error>> {
        let sink = SimulatorSink::bind("127.0.0.1:0".parse()?)?;
        let client = TcpStream::connect(sink.local_addr())?;
        eventually(|| sink.client_count() == 1, "client never accepted");
        drop(client);

        let frame = SinkFrame {
            leds: vec![Rgb::WHITE; 512],
            debug_elements: vec![],
        };
        // The first write after a disconnect may still succeed; a later one fails.
        eventually(
            || {
                let _ = sink.send(&frame);
                sink.client_count() == 0
            },
            "disconnected client never dropped",
        );
        Ok(())
    }
}
