pub mod config;
pub mod detector;
pub mod error;
pub mod index;
pub mod inspector;
pub mod lexer;
pub mod model;
pub mod scanner;
pub mod server;
pub mod synthesizer;
pub mod tracker;

pub use error::{ItemError, TrackError};
pub use model::{FunctionDefinition, Language, Parameter, Signature, Suggestion, UsageSite};
pub use tracker::{DetectReport, FunctionTracker, ScanReport};
