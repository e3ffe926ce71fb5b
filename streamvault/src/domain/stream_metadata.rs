//! Generated artefact paths attached to a stream.

use serde::{Deserialize, Serialize};

/// Paths of generated sidecar files for a stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub id: i64,
    pub stream_id: i64,
    pub json_path: Option<String>,
    pub nfo_path: Option<String>,
    pub tvshow_nfo_path: Option<String>,
    pub chapters_vtt_path: Option<String>,
    pub chapters_srt_path: Option<String>,
    pub chapters_ffmpeg_path: Option<String>,
    pub chapters_xml_path: Option<String>,
    pub thumbnail_path: Option<String>,
    /// Whether title/artist/date/genre were embedded into the MP4.
    pub metadata_embedded: bool,
}
