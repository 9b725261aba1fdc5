//! Newline-framed text link over TCP, e.g. to a serial-to-network bridge.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::{LogLevel, TransportConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::error::TransportError;
use crate::transport::{emit_log, EventSender, Transport, TransportEvent};

const SOURCE: &str = "line";

/// Longest inbound line kept; anything longer is discarded up to the next
/// separator.
pub const MAX_LINE_LEN: usize = 4096;

type Writer = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

#[derive(Default)]
struct Session {
    writer: Option<Writer>,
    reader: Option<JoinHandle<()>>,
    peer: Option<SocketAddr>,
}

pub struct LineLink {
    address: String,
    send_separator: String,
    receive_separator: u8,
    events: EventSender,
    session: Mutex<Session>,
}

impl LineLink {
    pub fn new(config: &TransportConfig, events: EventSender) -> Self {
        Self {
            address: config.address.clone(),
            send_separator: config.send_separator.clone(),
            receive_separator: config.receive_separator.bytes().next().unwrap_or(b'\n'),
            events,
            session: Mutex::new(Session::default()),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) -> bool {
        let mut session = self.session();
        let was_open = session.writer.take().is_some();
        if let Some(reader) = session.reader.take() {
            reader.abort();
        }
        session.peer = None;
        was_open
    }
}

impl Transport for LineLink {
    async fn connect(&self) -> Result<(), TransportError> {
        self.close();

        emit_log(
            &self.events,
            LogLevel::Info,
            SOURCE,
            format!("Connecting to {}...", self.address),
        );
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();

        let reader = tokio::spawn(read_lines(
            read_half,
            self.receive_separator,
            self.events.clone(),
        ));

        let mut session = self.session();
        session.writer = Some(Arc::new(tokio::sync::Mutex::new(write_half)));
        session.reader = Some(reader);
        session.peer = peer;
        drop(session);

        emit_log(
            &self.events,
            LogLevel::Info,
            SOURCE,
            format!("Connected to {}", self.address),
        );
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        if self.close() {
            emit_log(
                &self.events,
                LogLevel::Info,
                SOURCE,
                format!("Disconnected from {}", self.address),
            );
        }
        Ok(())
    }

    async fn send(&self, payload: &str) -> Result<(), TransportError> {
        let writer = self.session().writer.clone().ok_or(TransportError::NotConnected)?;

        let mut frame = String::with_capacity(payload.len() + self.send_separator.len());
        frame.push_str(payload);
        frame.push_str(&self.send_separator);

        let mut writer = writer.lock().await;
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;
        emit_log(&self.events, LogLevel::Debug, SOURCE, format!("'{payload}' sent"));
        Ok(())
    }

    fn device_name(&self) -> Option<String> {
        self.session().peer.map(|peer| peer.to_string())
    }
}

/// Splits the byte stream into messages. A trailing `\r` is dropped and empty
/// lines are skipped. Lines over [`MAX_LINE_LEN`] bytes are dropped whole.
async fn read_lines(mut reader: OwnedReadHalf, separator: u8, events: EventSender) {
    let mut buffer = Vec::new();
    let mut overflowed = false;
    let mut chunk = [0u8; 512];

    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => {
                emit_log(&events, LogLevel::Warn, SOURCE, "Connection closed by device".to_string());
                break;
            }
            Ok(read) => read,
            Err(err) => {
                emit_log(&events, LogLevel::Error, SOURCE, format!("Read failed: {err}"));
                break;
            }
        };

        for &byte in &chunk[..read] {
            if byte != separator {
                if overflowed {
                    continue;
                }
                if buffer.len() == MAX_LINE_LEN {
                    buffer.clear();
                    overflowed = true;
                    emit_log(
                        &events,
                        LogLevel::Warn,
                        SOURCE,
                        format!("Dropped inbound line longer than {MAX_LINE_LEN} bytes"),
                    );
                    continue;
                }
                buffer.push(byte);
                continue;
            }
            if overflowed {
                overflowed = false;
                continue;
            }
            if buffer.last() == Some(&b'\r') {
                buffer.pop();
            }
            if buffer.is_empty() {
                continue;
            }
            let message = String::from_utf8_lossy(&buffer).into_owned();
            buffer.clear();
            if events.send(TransportEvent::Received(message)).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::event_channel;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    fn config(address: String) -> TransportConfig {
        TransportConfig {
            address,
            ..TransportConfig::default()
        }
    }

    #[tokio::test]
    async fn frames_messages_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let device = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            // Reply split across writes, CRLF terminated, with an empty line.
            write_half.write_all(b"O").await.unwrap();
            write_half.write_all(b"K\r\n\r\nUNKNOWN: ").await.unwrap();
            write_half.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
            lines
        });

        let (events, mut receiver) = event_channel();
        let link = LineLink::new(&config(address.to_string()), events);
        assert!(matches!(link.send("early").await, Err(TransportError::NotConnected)));

        link.connect().await.unwrap();
        assert_eq!(link.device_name(), Some(address.to_string()));
        link.send("ping").await.unwrap();

        let mut received = Vec::new();
        while received.len() < 2 {
            if let Some(TransportEvent::Received(message)) = receiver.recv().await {
                received.push(message);
            }
        }
        assert_eq!(received, vec!["OK", "UNKNOWN: ping"]);

        link.disconnect().unwrap();
        link.disconnect().unwrap();
        assert_eq!(link.device_name(), None);
        assert!(matches!(link.send("late").await, Err(TransportError::NotConnected)));
        drop(device.await.unwrap());
    }

    #[tokio::test]
    async fn oversized_line_is_dropped_with_warning() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let device = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let flood = vec![b'x'; MAX_LINE_LEN * 3];
            socket.write_all(&flood).await.unwrap();
            socket.write_all(b"\nOK\n").await.unwrap();
            socket
        });

        let (events, mut receiver) = event_channel();
        let link = LineLink::new(&config(address.to_string()), events);
        link.connect().await.unwrap();

        let mut warnings = Vec::new();
        let received = loop {
            match receiver.recv().await {
                Some(TransportEvent::Received(message)) => break message,
                Some(TransportEvent::Log { level: LogLevel::Warn, message, .. }) => warnings.push(message),
                Some(_) => {}
                None => panic!("event stream closed"),
            }
        };

        assert_eq!(received, "OK");
        assert_eq!(
            warnings,
            vec![format!("Dropped inbound line longer than {MAX_LINE_LEN} bytes")]
        );
        link.disconnect().unwrap();
        drop(device.await.unwrap());
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        // Bind then drop so nothing listens on the port.
        let address = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let (events, _receiver) = event_channel();
        let link = LineLink::new(&config(address.to_string()), events);
        assert!(matches!(link.connect().await, Err(TransportError::Io(_))));
    }
}
