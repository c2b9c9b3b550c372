mod frame_file_sink;
mod track_stats_sink;

pub use frame_file_sink::FrameFileSink;
pub use track_stats_sink::TrackStatsSink;
