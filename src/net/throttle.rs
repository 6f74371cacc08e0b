//! Byte-rate limiting for untrusted inbound streams.
//!
//! # Responsibilities
//! - Cap how fast a peer can feed bytes into the handshake parser
//! - Suspend (not spin) the reading task while quota is exhausted
//! - Leave writes, flushes, and shutdowns completely untouched
//!
//! # Design Decisions
//! - One limiter instance per connection, owned by the wrapper; no shared
//!   state between connections
//! - The limiter only delays; stream errors always come from the inner stream

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep_until, Instant, Sleep};

/// A token-bucket byte quota for a single connection.
///
/// Tokens are bytes. The bucket starts full (one burst worth) and refills
/// continuously at `rate` bytes per second, capped at `capacity`.
#[derive(Debug)]
pub struct ReadLimiter {
    tokens: f64,
    last_update: Instant,
    rate: f64,
    capacity: f64,
}

impl ReadLimiter {
    /// Create a limiter allowing `bytes_per_second` sustained throughput
    /// with bursts up to `burst_bytes`.
    pub fn new(bytes_per_second: u64, burst_bytes: u64) -> Self {
        // A zero rate would never replenish; floor both at one byte.
        let rate = (bytes_per_second as f64).max(1.0);
        let capacity = (burst_bytes as f64).max(1.0);
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate,
            capacity,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }

    /// Bytes that may be read right now.
    fn available(&mut self, now: Instant) -> usize {
        self.refill(now);
        self.tokens as usize
    }

    fn consume(&mut self, n: usize) {
        self.tokens -= n as f64;
    }

    /// Instant at which at least one byte of quota will have accrued.
    fn next_ready(&self, now: Instant) -> Instant {
        let deficit = (1.0 - self.tokens).max(0.0);
        now + Duration::from_secs_f64(deficit / self.rate)
    }
}

/// Stream wrapper that applies a [`ReadLimiter`] to inbound bytes.
///
/// `poll_read` first consults the limiter: with no quota it parks the task
/// on a timer until a byte accrues, then reads at most the permitted count
/// from the inner stream. Write-side methods delegate unchanged.
#[derive(Debug)]
pub struct Throttled<S> {
    inner: S,
    limiter: ReadLimiter,
    delay: Option<Pin<Box<Sleep>>>,
}

impl<S> Throttled<S> {
    pub fn new(inner: S, limiter: ReadLimiter) -> Self {
        Self {
            inner,
            limiter,
            delay: None,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Throttled<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            if let Some(delay) = me.delay.as_mut() {
                ready!(delay.as_mut().poll(cx));
                me.delay = None;
            }

            let now = Instant::now();
            let allowed = me.limiter.available(now);
            if allowed == 0 {
                me.delay = Some(Box::pin(sleep_until(me.limiter.next_ready(now))));
                continue;
            }

            let mut limited = buf.take(allowed.min(buf.remaining()));
            ready!(Pin::new(&mut me.inner).poll_read(cx, &mut limited))?;
            let n = limited.filled().len();

            // Fold the capped sub-buffer back into the caller's buffer.
            unsafe { buf.assume_init(n) };
            buf.advance(n);
            me.limiter.consume(n);
            return Poll::Ready(Ok(()));
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Throttled<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
