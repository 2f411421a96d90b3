//! Services - the decision logic of the agent
//!
//! - `normalizer` - per-source field mapping, defaults, occupancy and now-playing rules
//! - `assembler` - canonical outbound message construction
//! - `publish_loop` - connect / tick / shutdown state machine

pub mod assembler;
pub mod normalizer;
pub mod publish_loop;

// Re-export commonly used types
pub use assembler::MessageAssembler;
pub use normalizer::FieldNormalizer;
pub use publish_loop::{LoopSettings, LoopState, PublishLoop, TickOutcome};
