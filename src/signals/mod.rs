// Unix signal wiring for graceful shutdown
// Turns process signals into a cancellation token or a signal channel.
// The coordinator itself never sees a signal; it only tracks outstanding work.

use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use futures::StreamExt;
use signal_hook::consts::*;
use signal_hook_tokio::{Handle, Signals};
use std::ffi::c_int;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Buffer size of the channel returned by [`with_channel`]
pub const SIGNAL_CHANNEL_CAPACITY: usize = 2;

/// Create a coordinator plus a token cancelled by the first of `signals`.
///
/// The returned token is a child of `parent`, so cancelling `parent` cancels it
/// as well. The listener runs on a spawned task and must be created inside a
/// Tokio runtime. Stop listening with [`SignalRelease::release`]; dropping the
/// release handle leaves the listener in place.
pub fn with_context(
    parent: &CancellationToken,
    signals: &[c_int],
) -> Result<(Coordinator, CancellationToken, SignalRelease)> {
    let mut stream = Signals::new(signals)?;
    let handle = stream.handle();
    let token = parent.child_token();

    let listener = token.clone();
    let listener_handle = handle.clone();
    tokio::spawn(async move {
        tokio::select! {
            received = stream.next() => {
                if let Some(signal) = received {
                    info!(signal = signal_name(signal), "Received {} - graceful shutdown initiated", signal_name(signal));
                    listener.cancel();
                }
            }
            _ = listener.cancelled() => {
                debug!("shutdown token cancelled, signal listener exiting");
            }
        }
        listener_handle.close();
    });

    debug!(signals = ?signals, "signal handlers installed");
    Ok((Coordinator::new(), token.clone(), SignalRelease { token, handle }))
}

/// Stops a [`with_context`] listener and cancels its token
#[must_use = "keep the release handle to stop listening for signals later"]
pub struct SignalRelease {
    token: CancellationToken,
    handle: Handle,
}

impl SignalRelease {
    pub fn release(self) {
        self.handle.close();
        self.token.cancel();
    }
}

impl std::fmt::Debug for SignalRelease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRelease")
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Create a coordinator plus a channel receiving the raw signal numbers.
///
/// Delivery never blocks the listener: once [`SIGNAL_CHANNEL_CAPACITY`]
/// signals are buffered, later ones are dropped until the receiver catches up.
pub fn with_channel(signals: &[c_int]) -> Result<(Coordinator, SignalChannel)> {
    let mut stream = Signals::new(signals)?;
    let handle = stream.handle();
    let (tx, rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        while let Some(signal) = stream.next().await {
            match tx.try_send(signal) {
                Ok(()) => info!(signal = signal_name(signal), "signal forwarded"),
                Err(TrySendError::Full(_)) => {
                    warn!(signal = signal_name(signal), "signal channel full, dropping signal");
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
        debug!("signal channel listener exiting");
    });

    Ok((Coordinator::new(), SignalChannel { rx, handle }))
}

/// Receiving end of [`with_channel`]; unregisters its handlers when dropped
pub struct SignalChannel {
    rx: mpsc::Receiver<c_int>,
    handle: Handle,
}

impl SignalChannel {
    /// Next delivered signal, `None` once the channel is closed and empty
    pub async fn recv(&mut self) -> Option<c_int> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<c_int> {
        self.rx.try_recv().ok()
    }

    /// Stop listening; already buffered signals can still be received
    pub fn close(&mut self) {
        self.handle.close();
    }
}

impl std::fmt::Debug for SignalChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalChannel").finish_non_exhaustive()
    }
}

impl Drop for SignalChannel {
    fn drop(&mut self) {
        self.handle.close();
    }
}

/// Resolve a signal name such as `SIGTERM`, `term` or `Int` to its number
pub fn parse_signal(name: &str) -> Result<c_int> {
    let upper = name.trim().to_ascii_uppercase();
    let short = upper.strip_prefix("SIG").unwrap_or(&upper);

    let signal = match short {
        "INT" => SIGINT,
        "TERM" => SIGTERM,
        "HUP" => SIGHUP,
        "QUIT" => SIGQUIT,
        "USR1" => SIGUSR1,
        "USR2" => SIGUSR2,
        "WINCH" => SIGWINCH,
        "ALRM" => SIGALRM,
        "KILL" => SIGKILL,
        "STOP" => SIGSTOP,
        _ => return Err(Error::UnknownSignal(name.to_string())),
    };

    if FORBIDDEN.contains(&signal) {
        return Err(Error::ForbiddenSignal(name.to_string()));
    }

    Ok(signal)
}

/// Human readable name for log output
pub fn signal_name(signal: c_int) -> &'static str {
    match signal {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        SIGHUP => "SIGHUP",
        SIGQUIT => "SIGQUIT",
        SIGUSR1 => "SIGUSR1",
        SIGUSR2 => "SIGUSR2",
        SIGWINCH => "SIGWINCH",
        SIGALRM => "SIGALRM",
        _ => "unknown",
    }
}
