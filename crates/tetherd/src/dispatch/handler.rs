//! Connection handler that serves JSONL requests.
//!
//! A connection carries any number of request lines. Each non-blank line
//! produces exactly one response line, written and flushed before the next
//! request is read. A line longer than [`MAX_REQUEST_BYTES`] is answered with
//! `request_too_large` and the connection is closed, since the rest of the
//! oversized line cannot be framed reliably.

use std::io::{self, BufRead, BufReader, Read};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::transport::{ConnectionHandler, ConnectionStream};

use super::dispatcher::Dispatcher;
use super::errors::DispatchError;
use super::outcome::Reply;
use super::request::CommandRequest;
use super::response::ResponseWriter;
use super::router::DISPATCH_TARGET;

/// Maximum size of a single request line in bytes, excluding the newline.
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Serves driver connections through a shared [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatchConnectionHandler {
    dispatcher: Arc<Dispatcher>,
}

impl DispatchConnectionHandler {
    /// Creates a handler dispatching through `dispatcher`.
    #[must_use]
    pub const fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    fn serve(&self, line: &[u8]) -> Result<Reply, DispatchError> {
        let request = CommandRequest::parse(line)?;
        request.validate()?;
        let method = request.method();
        let result = self.dispatcher.dispatch(method, request.args());
        match &result {
            Ok(reply) => debug!(
                target: DISPATCH_TARGET,
                method,
                reply_type = reply.type_tag(),
                "request served"
            ),
            Err(error) => debug!(
                target: DISPATCH_TARGET,
                method,
                code = %error.code(),
                %error,
                "request failed"
            ),
        }
        result
    }
}

impl ConnectionHandler for DispatchConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        let read_half = match stream.try_clone() {
            Ok(read_half) => read_half,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to split connection");
                return;
            }
        };
        let mut reader = BufReader::new(read_half);
        let mut writer = ResponseWriter::new(stream);
        let mut line = Vec::new();

        loop {
            line.clear();
            match read_request_line(&mut reader, &mut line) {
                Ok(LineRead::Complete) => {}
                Ok(LineRead::End) => break,
                Ok(LineRead::TooLarge) => {
                    let error = DispatchError::request_too_large(line.len(), MAX_REQUEST_BYTES);
                    warn!(target: DISPATCH_TARGET, %error, "closing connection");
                    if let Err(error) = writer.write_error(&error) {
                        debug!(target: DISPATCH_TARGET, %error, "failed to report oversized request");
                    }
                    break;
                }
                Err(error) => {
                    warn!(target: DISPATCH_TARGET, %error, "failed to read request");
                    break;
                }
            }

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let written = match self.serve(&line) {
                Ok(reply) => writer.write_reply(&reply),
                Err(error) => writer.write_error(&error),
            };
            if let Err(error) = written {
                warn!(target: DISPATCH_TARGET, %error, "failed to write response");
                break;
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    Complete,
    TooLarge,
    End,
}

/// Reads one newline-terminated line into `line`.
///
/// A final line without a newline still counts as a request.
fn read_request_line<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> io::Result<LineRead> {
    let limit = MAX_REQUEST_BYTES as u64 + 1;
    let read = reader.by_ref().take(limit).read_until(b'\n', line)?;
    if read == 0 {
        return Ok(LineRead::End);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
        return Ok(LineRead::Complete);
    }
    if line.len() > MAX_REQUEST_BYTES {
        return Ok(LineRead::TooLarge);
    }
    Ok(LineRead::Complete)
}
