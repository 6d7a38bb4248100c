//! Upload conversation for deck background replacement.
//!
//! A user sends a deck, then an image. [`Orchestrator`] keeps the pending
//! deck in a [`deckbg_core::SessionStore`], runs the transform off the async
//! runtime and always removes the per-user files afterwards. Everything that
//! talks to the outside world goes through a [`Transport`].

pub mod config;
pub mod messages;
pub mod orchestrator;
pub mod transport;

pub use config::ServiceConfig;
pub use orchestrator::{DeckOutcome, ImageOutcome, Orchestrator};
pub use transport::{FileRef, StatusHandle, Transport};
