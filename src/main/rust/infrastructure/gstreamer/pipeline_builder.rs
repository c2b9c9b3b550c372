pub struct PipelineBuilder;

impl PipelineBuilder {
    /// Build the playbin launch string for an HLS playlist.
    /// Audio is discarded; the video sink is configurable so a headless
    /// client can still decode and clock the stream.
    pub fn build_playlist_string(url: &str, video_sink: &str) -> String {
        format!(
            "playbin uri=\"{}\" video-sink=\"{}\" audio-sink=fakesink",
            url, video_sink
        )
    }
}
