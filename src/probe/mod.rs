//! Language capability queries
//!
//! Two independent side queries, neither of which alters the listen path by
//! default:
//! - the language-details probe, fired on every start and only logged
//! - the recognition support pre-flight, run before listening when enabled

mod language;
mod preflight;

pub use language::{spawn_probe, CommandLanguageDetails, LanguageDetailsSource};
pub use preflight::preflight;
