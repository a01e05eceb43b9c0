//! Inbound file exchange with the ODFI.
//!
//! On every poll the [`Downloader`] materializes the remote inbound,
//! reconciliation, and return directories into a fresh local scratch
//! tree; the [`OdfiWorker`] hands that tree to a downstream
//! [`InboundProcessor`] and cleans up per the storage config.

pub mod download;
pub mod worker;

pub use download::{DownloadError, DownloadedFiles, Downloader};
pub use worker::{InboundProcessor, OdfiWorker};
