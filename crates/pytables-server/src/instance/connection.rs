//! Line protocol spoken with a single client.
//!
//! Requests are newline-terminated lines of the form `<id> <message>`.
//! Every reply line is prefixed with a three-digit hexadecimal sequence
//! number that wraps at `0x1000` and is tracked per connection.

use std::io;
use std::sync::Arc;

use pytables_config::Variant;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, warn};

use super::INSTANCE_TARGET;

/// Longest request line accepted, newline included.
const MAX_LINE_BYTES: u64 = 64 * 1024;

/// Sequence numbers wrap at this value.
const REPLY_WRAP: u16 = 0x1000;

/// Produces the replies to one client message.
pub trait MessageHandler: Send + Sync {
    /// Handles `message` received by the `variant` instance and returns the
    /// reply lines, without framing.
    fn handle(&self, variant: Variant, message: &str) -> Vec<String>;
}

/// Handler acknowledging every message with `OK`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcknowledgingHandler;

impl MessageHandler for AcknowledgingHandler {
    fn handle(&self, _variant: Variant, _message: &str) -> Vec<String> {
        vec![String::from("OK")]
    }
}

#[derive(Debug, Default)]
pub(super) struct ReplyCounter {
    next: u16,
}

impl ReplyCounter {
    pub(super) fn frame(&mut self, reply: &str) -> String {
        let framed = format!("{:03x} {reply}\n", self.next);
        self.next = (self.next + 1) % REPLY_WRAP;
        framed
    }
}

/// Splits a request into its client identifier and message.
pub(super) fn parse_message(line: &str) -> Option<(&str, &str)> {
    line.split_once(' ')
}

pub(super) async fn serve_connection(
    stream: UnixStream,
    variant: Variant,
    handler: Arc<dyn MessageHandler>,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut counter = ReplyCounter::default();
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES)
            .read_until(b'\n', &mut buffer)
            .await?;
        if read == 0 {
            return Ok(());
        }
        if buffer.last() != Some(&b'\n') {
            if read as u64 >= MAX_LINE_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "request line exceeds the size limit",
                ));
            }
            // Partial line followed by EOF.
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buffer);
        let line = line.trim_end_matches(['\n', '\r']);
        let Some((client, message)) = parse_message(line) else {
            warn!(
                target: INSTANCE_TARGET,
                variant = %variant,
                line,
                "discarding message with wrong format"
            );
            continue;
        };
        debug!(
            target: INSTANCE_TARGET,
            variant = %variant,
            client,
            message,
            "processing message"
        );
        let mut framed = String::new();
        for reply in handler.handle(variant, message) {
            framed.push_str(&counter.frame(&reply));
        }
        if !framed.is_empty() {
            writer.write_all(framed.as_bytes()).await?;
        }
    }
}
