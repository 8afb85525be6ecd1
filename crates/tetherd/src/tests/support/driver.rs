//! Minimal driver speaking the JSONL protocol to a running daemon.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use serde_json::Value;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// One driver connection; requests are answered in order.
pub struct TestDriver {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TestDriver {
    /// Connects to a daemon listening on `addr`.
    #[must_use]
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect to daemon");
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("set read timeout");
        let writer = stream.try_clone().expect("clone driver stream");
        Self {
            reader: BufReader::new(stream),
            writer,
        }
    }

    /// Sends `request` as one line and returns the parsed response.
    pub fn send(&mut self, request: &Value) -> Value {
        let mut line = serde_json::to_vec(request).expect("serialise request");
        line.push(b'\n');
        self.send_raw(&line)
    }

    /// Sends raw bytes and returns the next response line.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Value {
        self.writer.write_all(bytes).expect("write request");
        self.writer.flush().expect("flush request");
        let mut response = String::new();
        self.reader
            .read_line(&mut response)
            .expect("read response");
        serde_json::from_str(&response).expect("response is JSON")
    }
}
