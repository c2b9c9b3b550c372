mod pipeline_builder;
mod playbin_player;

pub use pipeline_builder::PipelineBuilder;
pub use playbin_player::{PlaybinPlayer, PlaybinPlayerFactory, DEFAULT_VIDEO_SINK};
