//! Request/response correlation over a framed receive buffer.
//!
//! Inbound bytes are appended to a receive buffer and split on the line
//! delimiter. Each complete line goes to the oldest pending waiter. Lines
//! that arrive while nobody is waiting stay buffered and are handed to the
//! next waiter that registers, so an unsolicited server line is delivered
//! to whichever read comes next.

use std::collections::VecDeque;

use bytes::BytesMut;
use tokio::sync::oneshot;

use super::config::Delimiter;
use crate::error::{Error, Result};

/// Maximum line length to prevent memory exhaustion.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Identifier of a pending waiter.
pub type WaiterId = u64;

/// Receiving end of a waiter's fulfilment slot.
pub type Slot = oneshot::Receiver<Result<String>>;

#[derive(Debug)]
struct Waiter {
    id: WaiterId,
    slot: oneshot::Sender<Result<String>>,
}

/// FIFO queue of pending waiters fed by a line-framed receive buffer.
#[derive(Debug)]
pub struct Correlator {
    delimiter: Delimiter,
    buffer: BytesMut,
    /// Bytes at the start of `buffer` known to contain no delimiter.
    scanned: usize,
    /// Framed lines whose waiter went away before delivery.
    ready: VecDeque<String>,
    waiters: VecDeque<Waiter>,
    next_id: WaiterId,
    max_line: usize,
    /// Local close: nothing more is delivered.
    closed: bool,
    /// Peer closed: buffered lines are still delivered.
    eof: bool,
}

impl Correlator {
    /// Creates an empty correlator.
    #[must_use]
    pub fn new(delimiter: Delimiter) -> Self {
        Self {
            delimiter,
            buffer: BytesMut::with_capacity(1024),
            scanned: 0,
            ready: VecDeque::new(),
            waiters: VecDeque::new(),
            next_id: 0,
            max_line: MAX_LINE_LENGTH,
            closed: false,
            eof: false,
        }
    }

    /// Overrides the maximum line length.
    #[must_use]
    pub const fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    /// Returns true once closed locally or by the peer.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed || self.eof
    }

    /// Number of queued waiters.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.waiters.len()
    }

    /// Number of buffered bytes not yet delivered as lines.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len() + self.ready.iter().map(String::len).sum::<usize>()
    }

    /// Queues a waiter for the next line.
    ///
    /// A line that is already buffered is delivered immediately.
    pub fn register(&mut self) -> (WaiterId, Slot) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;

        if self.closed {
            let _ = tx.send(Err(Error::ConnectionClosed));
            return (id, rx);
        }

        self.waiters.push_back(Waiter { id, slot: tx });
        self.dispatch();

        if self.eof {
            self.fail_all(|| Error::ConnectionClosed);
        }
        (id, rx)
    }

    /// Removes a waiter whose deadline expired.
    ///
    /// Returns false if the waiter is no longer queued, meaning its slot
    /// has already been filled.
    pub fn cancel(&mut self, id: WaiterId) -> bool {
        let Some(index) = self.waiters.iter().position(|w| w.id == id) else {
            return false;
        };
        self.waiters.remove(index);
        true
    }

    /// Appends inbound bytes and delivers every complete line that has a
    /// waiter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineTooLong`] if the partial line exceeds the
    /// maximum length; all waiters are failed and the correlator closes.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        self.buffer.extend_from_slice(data);
        self.dispatch();

        if self.find_delimiter().is_none() && self.buffer.len() > self.max_line {
            let max = self.max_line;
            self.fail_all(|| Error::LineTooLong(max));
            self.release();
            return Err(Error::LineTooLong(max));
        }
        Ok(())
    }

    /// Records that the peer closed its side.
    ///
    /// Queued waiters fail with [`Error::ConnectionClosed`]; complete lines
    /// still buffered remain available to later reads.
    pub fn peer_closed(&mut self) {
        self.eof = true;
        self.fail_all(|| Error::ConnectionClosed);
    }

    /// Fails the oldest waiter with a transport error and closes.
    pub fn fail(&mut self, error: Error) {
        if let Some(waiter) = self.waiters.pop_front() {
            let _ = waiter.slot.send(Err(error));
        }
        self.close();
    }

    /// Closes locally: every queued waiter fails with
    /// [`Error::ConnectionClosed`] and the buffer is released.
    pub fn close(&mut self) {
        self.fail_all(|| Error::ConnectionClosed);
        self.release();
    }

    fn release(&mut self) {
        self.closed = true;
        self.buffer = BytesMut::new();
        self.scanned = 0;
        self.ready.clear();
    }

    fn fail_all(&mut self, error: impl Fn() -> Error) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.slot.send(Err(error()));
        }
    }

    fn dispatch(&mut self) {
        while !self.waiters.is_empty() {
            let Some(mut line) = self.next_line() else {
                break;
            };
            while let Some(waiter) = self.waiters.pop_front() {
                match waiter.slot.send(Ok(line)) {
                    Ok(()) => break,
                    // The caller stopped waiting; offer the line to the next one.
                    Err(returned) => match returned {
                        Ok(back) => line = back,
                        Err(_) => return,
                    },
                }
                if self.waiters.is_empty() {
                    self.ready.push_front(line);
                    return;
                }
            }
        }
    }

    fn next_line(&mut self) -> Option<String> {
        if let Some(line) = self.ready.pop_front() {
            return Some(line);
        }
        let pos = self.find_delimiter()?;
        let delimiter = self.delimiter.as_bytes();
        let frame = self.buffer.split_to(pos + delimiter.len());
        self.scanned = 0;
        Some(String::from_utf8_lossy(&frame[..pos]).into_owned())
    }

    fn find_delimiter(&mut self) -> Option<usize> {
        let delimiter = self.delimiter.as_bytes();
        // A CRLF may straddle the previous scan boundary.
        let start = self.scanned.saturating_sub(delimiter.len() - 1);
        let found = self.buffer[start..]
            .windows(delimiter.len())
            .position(|w| w == delimiter)
            .map(|p| p + start);
        if found.is_none() {
            self.scanned = self.buffer.len();
        }
        found
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn take(slot: &mut Slot) -> Result<String> {
        slot.try_recv().expect("slot not filled")
    }

    #[test]
    fn delivers_in_fifo_order() {
        let mut c = Correlator::new(Delimiter::CrLf);
        let (_, mut first) = c.register();
        let (_, mut second) = c.register();

        c.feed(b"250 one\r\n250 two\r\n").unwrap();

        assert_eq!(take(&mut first).unwrap(), "250 one");
        assert_eq!(take(&mut second).unwrap(), "250 two");
        assert_eq!(c.pending(), 0);
    }

    #[test]
    fn partial_line_waits_for_more_data() {
        let mut c = Correlator::new(Delimiter::CrLf);
        let (_, mut slot) = c.register();

        c.feed(b"220 mx.exa").unwrap();
        assert!(slot.try_recv().is_err());

        c.feed(b"mple.com ESMTP\r").unwrap();
        assert!(slot.try_recv().is_err());

        c.feed(b"\n").unwrap();
        assert_eq!(take(&mut slot).unwrap(), "220 mx.example.com ESMTP");
    }

    #[test]
    fn line_without_waiter_stays_buffered() {
        let mut c = Correlator::new(Delimiter::Lf);
        c.feed(b"+OK early\n").unwrap();
        assert_eq!(c.buffered(), 10);

        let (_, mut slot) = c.register();
        assert_eq!(take(&mut slot).unwrap(), "+OK early");
        assert_eq!(c.buffered(), 0);
    }

    #[test]
    fn lf_mode_keeps_carriage_return() {
        let mut c = Correlator::new(Delimiter::Lf);
        let (_, mut slot) = c.register();
        c.feed(b"hello\r\n").unwrap();
        assert_eq!(take(&mut slot).unwrap(), "hello\r");
    }

    #[test]
    fn cancelled_waiter_is_skipped() {
        let mut c = Correlator::new(Delimiter::CrLf);
        let (id, mut expired) = c.register();
        assert!(c.cancel(id));
        assert!(!c.cancel(id));

        let (_, mut next) = c.register();
        c.feed(b"250 late\r\n").unwrap();

        assert!(expired.try_recv().is_err());
        assert_eq!(take(&mut next).unwrap(), "250 late");
    }

    #[test]
    fn cancel_after_fulfilment_reports_false() {
        let mut c = Correlator::new(Delimiter::CrLf);
        let (id, mut slot) = c.register();
        c.feed(b"250 ok\r\n").unwrap();
        assert!(!c.cancel(id));
        assert_eq!(take(&mut slot).unwrap(), "250 ok");
    }

    #[test]
    fn dropped_receiver_passes_line_on() {
        let mut c = Correlator::new(Delimiter::CrLf);
        let (_, abandoned) = c.register();
        drop(abandoned);

        c.feed(b"250 kept\r\n").unwrap();
        let (_, mut slot) = c.register();
        assert_eq!(take(&mut slot).unwrap(), "250 kept");
    }

    #[test]
    fn close_fails_every_waiter() {
        let mut c = Correlator::new(Delimiter::CrLf);
        let (_, mut a) = c.register();
        let (_, mut b) = c.register();
        c.close();

        assert!(matches!(take(&mut a), Err(Error::ConnectionClosed)));
        assert!(matches!(take(&mut b), Err(Error::ConnectionClosed)));

        let (_, mut after) = c.register();
        assert!(matches!(take(&mut after), Err(Error::ConnectionClosed)));
        assert!(c.feed(b"250 ignored\r\n").is_err());
    }

    #[test]
    fn peer_close_still_delivers_buffered_lines() {
        let mut c = Correlator::new(Delimiter::CrLf);
        c.feed(b"554 go away\r\n").unwrap();
        c.peer_closed();

        let (_, mut first) = c.register();
        assert_eq!(take(&mut first).unwrap(), "554 go away");

        let (_, mut second) = c.register();
        assert!(matches!(take(&mut second), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn overlong_line_is_rejected() {
        let mut c = Correlator::new(Delimiter::CrLf).with_max_line(8);
        let (_, mut slot) = c.register();
        assert!(matches!(c.feed(b"123456789"), Err(Error::LineTooLong(8))));
        assert!(matches!(take(&mut slot), Err(Error::LineTooLong(8))));
        assert!(c.is_closed());
    }

    #[test]
    fn transport_failure_goes_to_oldest_waiter() {
        let mut c = Correlator::new(Delimiter::CrLf);
        let (_, mut a) = c.register();
        let (_, mut b) = c.register();
        c.fail(Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset)));

        assert!(matches!(take(&mut a), Err(Error::Io(_))));
        assert!(matches!(take(&mut b), Err(Error::ConnectionClosed)));
    }
}
