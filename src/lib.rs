//! Session activity reports: clip sessions to a reporting window, total them
//! per entity, then filter, sort and page the results for display.
//!
//! The engine ([`projections`], [`ordering`], [`pagination`], [`pipeline`])
//! is pure. [`store`] and [`api`] are the data source and renderer that sit
//! around it.

pub mod api;
pub mod config;
pub mod error;
pub mod format;
pub mod models;
pub mod ordering;
pub mod pagination;
pub mod pipeline;
pub mod projections;
pub mod store;

pub use error::{ReportError, ReportResult};
pub use models::{AggregatedResult, Page, ReportOptions, ReportWindow, Session, SortOrder};
pub use pagination::paginate;
pub use pipeline::ReportPipeline;
pub use projections::{clip, ActivityAggregator, FnLabels, LabelLookup};
