//! Editing-session layer of the pathway course-flow builder.
//!
//! [`controller::BuilderController`] applies user intents to the graph model
//! and fans them out to history, reachability and the debounced
//! [`persistence::PersistenceCoordinator`]. [`session`] runs a controller as a
//! single tokio task behind a cloneable handle.

pub mod controller;
pub mod error;
pub mod persistence;
pub mod session;

pub use controller::{BuilderController, BuilderState, EditorView};
pub use error::BuilderError;
pub use persistence::SaveStatus;
pub use session::{EditorHandle, open_session, spawn_session};
