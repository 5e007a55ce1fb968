//! Plot directory manager: continuous discovery, validation, and tracking of
//! on-disk plot files, backed by a persistent header cache.
//!
//! The cryptographic signature machinery, the plot file-format parser (the
//! "prover"), and the configuration file layer producing the root directory
//! list are external collaborators; this crate consumes them through the
//! [`prover::ProverAdapter`] and [`source::PlotFilenameSource`] traits.

pub mod batch;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod events;
pub mod keys;
pub mod manager;
pub mod plot_info;
pub mod prover;
pub mod refresh;
pub mod source;
pub mod state;

pub use config::RefreshParameter;
pub use error::{PlotManagerError, Result};
pub use events::{RefreshCallback, RefreshEvent, RefreshResult};
pub use keys::{FarmerPublicKey, PlotPublicKey, PoolContractPuzzleHash, PoolPublicKey};
pub use manager::PlotManager;
pub use plot_info::PlotInfo;
pub use prover::{HeaderFileProverAdapter, PlotHeader, Prover, ProverAdapter};
pub use source::{FilesystemPlotSource, PlotDirectory, PlotFilenameSource};
