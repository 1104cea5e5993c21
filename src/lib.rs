//! # range-serve
//!
//! Document delivery over HTTP for [`axum`][1], in three modes:
//!
//! - the whole resource as a plain stream,
//! - byte ranges (`Range: bytes=...`) answered with 200, 206 or 416,
//! - the whole resource base64 encoded inside a JSON body.
//!
//! Resources are reached through the [`ResourceStore`] trait, with
//! [`FsStore`] for a directory on disk and [`MemoryStore`] for in-memory
//! data. Range handling is split into a parser ([`RangeOutcome::parse`]), a
//! planner ([`plan`]) which picks status and headers, and a bounded body
//! stream ([`WindowStream`]) which reads only the selected window.
//!
//! Any type implementing both [`AsyncRead`] and [`AsyncSeekStart`] can be
//! wrapped in a [`WindowStream`]. [`AsyncSeekStart`] is a trait defined by
//! this crate which only allows seeking from the start of a file. It is
//! automatically implemented for any type implementing [`AsyncSeek`].
//!
//! ```no_run
//! use range_serve::{router, AppState, Config, FsStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let app = router(AppState::new(FsStore::new(&config.root), config));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:4000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! [1]: https://docs.rs/axum
//! [`AsyncRead`]: tokio::io::AsyncRead

mod config;
mod encode;
mod error;
mod handler;
mod plan;
mod range;
mod resource;
mod stream;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::AsyncSeek;

pub use config::Config;
pub use encode::{encode, EncodedPayload};
pub use error::{ServeError, NOT_FOUND_MESSAGE};
pub use handler::{router, AppState, BASE64_PATH, RANGE_PATH, STREAM_PATH};
pub use plan::{plan, BodyPlan, DeliveryDecision};
pub use range::{ByteWindow, RangeError, RangeOutcome};
pub use resource::{
    BoxedReader, FsStore, MemoryStore, ResourceDescriptor, ResourceReader, ResourceStore,
    OCTET_STREAM,
};
pub use stream::WindowStream;

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the
    /// `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new
    /// stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// Binds `config.host:config.port` and serves files below `config.root`
/// until the process is stopped.
pub async fn serve(config: Config) -> io::Result<()> {
    let addr = config
        .socket_addr()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_on(listener, config).await
}

/// Serves on an already bound listener, e.g. one bound to port 0 in tests.
pub async fn serve_on(listener: tokio::net::TcpListener, config: Config) -> io::Result<()> {
    let store = FsStore::new(&config.root);
    tracing::info!(
        addr = %listener.local_addr()?,
        root = %store.root().display(),
        "server running",
    );
    axum::serve(listener, router(AppState::new(store, config))).await
}
