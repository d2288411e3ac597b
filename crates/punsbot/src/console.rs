//! Line-based console transport.
//!
//! Input lines are `chat_id<TAB>text`; replies are written to stdout as
//! `chat_id<TAB>line`, one output line per reply line.

use std::io::Write;
use std::sync::Mutex;

use punsbot_core::{ChatId, InboundMessage, PunsError, PunsResult, Transport};

/// Parse one input line. Returns `None` if it is not `chat_id<TAB>text`.
pub fn parse_line(line: &str) -> Option<InboundMessage> {
    let (chat_id, text) = line.split_once('\t')?;
    let chat_id: ChatId = chat_id.trim().parse().ok()?;
    Some(InboundMessage::new(chat_id, text.trim_end_matches(&['\r', '\n'][..])))
}

/// Number of chat workers: one per available core.
pub fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Worker index for `chat_id` among `workers` workers.
pub fn worker_for(chat_id: ChatId, workers: usize) -> usize {
    debug_assert!(workers > 0);
    chat_id.rem_euclid(workers as i64) as usize
}

/// Render a reply in the output line format.
pub fn format_reply(chat_id: ChatId, text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        out.push_str(&chat_id.to_string());
        out.push('\t');
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Writes replies to any `Write` sink, stdout by default.
pub struct ConsoleTransport<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleTransport<std::io::Stdout> {
    /// A transport writing to stdout.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleTransport<W> {
    /// Wrap a writer.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap()
    }
}

impl<W: Write + Send> Transport for ConsoleTransport<W> {
    fn reply(&self, chat_id: ChatId, text: &str) -> PunsResult<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| PunsError::internal("console output lock poisoned"))?;
        // Whole reply in one write so concurrent chats never interleave lines.
        out.write_all(format_reply(chat_id, text).as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let msg = parse_line("-100\tdame cinco\r").unwrap();
        assert_eq!(msg.chat_id, -100);
        assert_eq!(msg.text, "dame cinco");

        assert_eq!(parse_line("42\t/punadd a|b").unwrap().text, "/punadd a|b");
        assert!(parse_line("no tab here").is_none());
        assert!(parse_line("abc\thola").is_none());
    }

    #[test]
    fn test_worker_routing_is_stable_and_bounded() {
        for chat_id in [0, 1, 7, -1, -100_123_456, i64::MIN, i64::MAX] {
            let index = worker_for(chat_id, 4);
            assert!(index < 4);
            assert_eq!(index, worker_for(chat_id, 4));
        }
        assert_eq!(worker_for(5, 1), 0);
        assert!(worker_count() >= 1);
    }

    #[test]
    fn test_multiline_reply_is_prefixed_per_line() {
        let transport = ConsoleTransport::new(Vec::new());
        transport.reply(7, "Rules:\na -> b").unwrap();
        let written = String::from_utf8(transport.into_inner()).unwrap();
        assert_eq!(written, "7\tRules:\n7\ta -> b\n");
    }
}
