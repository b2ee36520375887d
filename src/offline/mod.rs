//! Canned answers served when the chat backend cannot be reached.

mod knowledge;
mod language;
mod synth;

#[cfg(test)]
pub use knowledge::KNOWLEDGE_BASE;
pub use language::Language;
#[cfg(test)]
pub use synth::OfflineReply;
pub use synth::{MatchMode, OfflineSynthesizer};
