//! Core domain types, session state and artifact cleanup for replacing the
//! background of a slide deck.

pub mod cleanup;
pub mod error;
pub mod image;
pub mod rebuild;
pub mod session;
pub mod types;

pub use cleanup::{cleanup_all, CleanupReport};
pub use error::{CleanupWarning, Error, Result};
pub use image::{BackgroundImage, ImageFormat};
pub use rebuild::rebuild_text_layer;
pub use session::{Session, SessionState, SessionStore, UserId};
pub use types::{Deck, FontSize, Geometry, Paragraph, Shape, ShapeKind, Slide, TextFrame};
