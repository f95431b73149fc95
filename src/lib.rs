#![warn(missing_docs)]
//! Character Forge - reimagine a character image with Gemini.
//!
//! The crate has two halves: a generation client that talks to the Gemini
//! `generateContent` API, and a [`Session`] state machine that a front end
//! drives from user actions.
//!
//! # Quick Start
//!
//! ```no_run
//! use charforge::{GenerationClient, ReferenceImage, Session};
//!
//! #[tokio::main]
//! async fn main() -> charforge::Result<()> {
//!     let client = GenerationClient::from_env()?;
//!     let mut session = Session::new();
//!     session.set_reference(ReferenceImage::from_file("character.png")?);
//!     session.set_prompt("Surfing a giant wave at sunset");
//!
//!     session.generate(&client).await;
//!     if let Some(result) = session.history().first() {
//!         result.save_to_dir(".")?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `cli` (default): the `charforge` command-line front end.

mod error;

pub mod client;
pub mod credentials;
pub mod session;
pub mod types;

// Re-export error types at crate root
pub use error::{ForgeError, Result};

pub use client::{
    ContentBackend, ForgeClient, GeminiBackend, GeminiBackendBuilder, GenerationClient,
    FALLBACK_PROMPT,
};
pub use credentials::{CredentialHook, KeySelection, KeySelector};
pub use session::{
    GenerationOutcome, GenerationTicket, ImprovementOutcome, ImprovementStep, ImprovementTicket,
    Session,
};
pub use types::{GeneratedResult, GenerationStatus, ImageFormat, QualityTier, ReferenceImage};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::client::{ForgeClient, GenerationClient};
    pub use crate::error::{ForgeError, Result};
    pub use crate::session::{GenerationOutcome, ImprovementOutcome, Session};
    pub use crate::types::{GeneratedResult, GenerationStatus, QualityTier, ReferenceImage};
}
