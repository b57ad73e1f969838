//! paramsync - Parameter synchronization engine for ArduPilot flight controllers
//!
//! This library implements the core of a flight-controller configuration tool:
//! loading ordered, comment-preserving parameter files, diffing them against
//! the values a connected flight controller reports, uploading the changed
//! subset one parameter at a time with verification and retry, and sequencing
//! the reboot that some parameters require before they take effect.
//!
//! # Modules
//!
//! - [`param`]: Parameter model types and reboot classification
//! - [`file`]: Parameter file store (load/save/diff, step sequence)
//! - [`transport`]: Flight controller transport trait and MAVLink implementation
//! - [`sync`]: The synchronization engine itself

pub mod file;
pub mod param;
pub mod sync;
pub mod transport;

pub use file::{diff, FileSet, ParameterFile, ParseError, StepFile};
pub use param::{requires_reboot, ParamFlags, ParamValue, Parameter, Tolerance};
pub use sync::{
    ApplyError, CancelToken, FailedParam, ProgressEvent, SyncConfig, SyncEngine, SyncResult,
    UploadState,
};
pub use transport::{FlightController, TransportError};
