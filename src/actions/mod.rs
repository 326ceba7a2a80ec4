//! File actions module.
//!
//! This module provides functionality for:
//! - Routing files into destination directories ([`route`])
//! - Recoverable removal via trash or a holding directory ([`recycle`])
//!
//! ```no_run
//! use dupesweep::actions::{route_file, RoutingMode};
//! use std::path::Path;
//!
//! let landed = route_file(Path::new("notes.docx"), Path::new("unsupported"), RoutingMode::Copy);
//! ```

pub mod recycle;
pub mod route;

pub use recycle::{RecycleError, Recycler};
pub use route::{move_file, route_file, unique_destination, RouteError, RoutingMode};
