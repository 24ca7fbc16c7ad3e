//! Completion bridge between an external inference engine and Rust callers.
//!
//! The engine reports every asynchronous operation through a single shape: a
//! function pointer plus an opaque context, fired once on a thread the engine owns
//! (see [`sys`]). This crate turns that shape into three consumption styles:
//! * Callback – a closure runs on the engine thread ([`Bridge::load_with_callback`]).
//! * Future – a [`BlockingFuture`] resolves once and can be waited on from anywhere ([`Bridge::load`]).
//! * Notifier – completions are queued on an [`AsyncNotifier`] and drained by any thread.
//!
//! Engine resources ([`Model`], [`Tensor`], [`TensorCollection`]) are move-only
//! wrappers that release their handle exactly once.
mod blob;
mod bridge;
mod collection;
mod error;
mod future;
mod handle;
mod model;
mod notifier;
mod outcome;
mod signal;
mod status;
mod tensor;

pub mod sys;

#[cfg(any(test, feature = "loopback"))]
pub mod loopback;


pub use blob::Blob;
pub use bridge::{Bridge, Locator};
pub use collection::TensorCollection;
pub use error::{ResultAccessError, TensorError};
pub use future::BlockingFuture;
pub use handle::Resource;
pub use model::Model;
pub use notifier::{AsyncNotifier, Delivery, NotifierToken};
pub use outcome::Outcome;
pub use signal::CompletionSignal;
pub use status::Status;
pub use tensor::{DataType, Element, Numeric, Tensor};
