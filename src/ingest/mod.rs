mod controller;
mod emitter;
mod loop_worker;
mod pipeline;
mod source;

pub use controller::IngestController;
pub use emitter::emit_annotated;
pub use loop_worker::{intake_loop, IntakeSummary};
pub use pipeline::LinkerPipeline;
pub use source::IntakeSource;
