//! Render control for the terrain view service.
//!
//! Everything between an assembled terrain grid and a finished image:
//!
//! ```text
//! request ──► SessionArtifactCache ──► terrain / drape / height field
//!                   │                        │
//!                   ▼                        ▼
//!          TempArtifactLedger ◄──── PovrayScene (.pov)
//!                                            │
//!              RenderAdmissionController ────┤ time slice + instance ceiling
//!                                            ▼
//!                                     Renderer (POV-Ray)
//! ```
//!
//! Every file a request creates is tracked in a ledger, either the
//! request's own or the session's, and removed when that scope ends.

pub mod admission;
pub mod config;
pub mod drape;
pub mod error;
pub mod heightfield;
pub mod ledger;
pub mod renderer;
pub mod scene;
pub mod session;
pub mod timeslice;

pub use admission::{AdmissionSnapshot, RenderAdmissionController, RenderPermit};
pub use config::{RenderConfig, SessionConfig};
pub use drape::{DrapeFetcher, DrapeKind, DrapeRequest};
pub use error::{RenderError, Result};
pub use heightfield::write_height_field;
pub use ledger::{LedgerScope, PreservedLedgers, TempArtifactLedger, TempNameGenerator};
pub use renderer::{PovrayRenderer, RenderJob, Renderer};
pub use scene::{Camera, PovrayScene, ViewParameters};
pub use session::{
    ArtifactBuilder, ArtifactScope, CacheHits, DrapeArtifact, RequestFingerprint,
    SessionArtifactCache, SessionArtifacts, SessionHandle, SessionStore,
};
pub use timeslice::TimeSliceAssigner;
