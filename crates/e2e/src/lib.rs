//! End-to-end test support for the Testwright engine
//!
//! Provides the two collaborators the engine is exercised against:
//! - [`backend`]: an axum dashboard API with projects, badges, and sort
//!   order persistence
//! - [`simpage`]: an in-memory dashboard page that implements [`Page`] and
//!   talks to the backend exclusively through the case's interception proxy
//!
//! [`Page`]: testwright_engine::page::Page

pub mod backend;
pub mod simpage;

pub use backend::BackendHandle;
pub use simpage::{SimPage, SimPageFactory};
