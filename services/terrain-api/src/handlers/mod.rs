//! HTTP request handlers.
//!
//! This module is organized into submodules:
//! - `view`: Web Terrain Service GetCapabilities, GetView, GetMonProtocol
//! - `dem`: DEM download (GetDEM, GetScene)
//! - `profile`: terrain profiles (GetGraph, GetElevation)
//! - `sheet`: TK25 sheet number lookup
//! - `status`: health checks, Prometheus metrics, service status
//! - `common`: exception reports and capabilities documents

pub mod common;
pub mod dem;
pub mod profile;
pub mod sheet;
pub mod status;
pub mod view;

pub use common::{api_error, capabilities_response, service_exception};

pub use view::{wts_handler, WtsParams};

pub use dem::{dem_handler, DemParams};

pub use profile::{profile_handler, ProfileParams};

pub use sheet::{sheet_handler, SheetParams};

pub use status::{health_handler, metrics_handler, status_handler};
