// graceful-drain
// Counting shutdown coordinator: register in-flight work, then wait for it to
// drain with an optional deadline that forces completion.
//
//     let (coordinator, token, release) =
//         graceful_drain::with_context(&CancellationToken::new(), &[SIGINT, SIGTERM])?;
//
//     let guard = coordinator.enter();
//     tokio::spawn(async move {
//         token.cancelled().await;
//         flush().await;
//         drop(guard);
//     });
//
//     coordinator.wait_with_timeout(Duration::from_secs(5)).await;
//     release.release();

pub mod config;
pub mod coordinator;
pub mod error;
pub mod observability;
pub mod signals;

pub use coordinator::{CleanupOutcome, Coordinator, ShutdownTracker, Subscription, WaitOutcome};
pub use error::{Error, Result};
pub use signals::{with_channel, with_context, SignalChannel, SignalRelease};
