//! Destination path computation for recordings and media-server artefacts.

mod template;

pub use template::{render_template, resolve_preset, sanitize_segment, TemplateContext};

use std::path::{Path, PathBuf};

/// Directory holding media-server artwork, relative to the recordings root.
pub const MEDIA_DIR: &str = ".media";

/// Per-streamer artwork directory: `.media/artwork/<streamer>/`.
pub fn artwork_dir(recordings_root: &Path, safe_streamer: &str) -> PathBuf {
    recordings_root
        .join(MEDIA_DIR)
        .join("artwork")
        .join(safe_streamer)
}

/// Category artwork file: `.media/categories/<safe-name>.jpg`.
pub fn category_image_path(recordings_root: &Path, category: &str) -> PathBuf {
    recordings_root
        .join(MEDIA_DIR)
        .join("categories")
        .join(format!("{}.jpg", sanitize_segment(category)))
}

/// Streamer top-level directory under the recordings root.
pub fn streamer_dir(recordings_root: &Path, safe_streamer: &str) -> PathBuf {
    recordings_root.join(safe_streamer)
}

/// Season directory in the `Season YYYY-MM` scheme.
pub fn season_dir_name(year: i32, month: u32) -> String {
    format!("Season {year:04}-{month:02}")
}

/// Whether `child` lies beneath `parent` after lexical normalisation.
///
/// Operates on components only; neither path needs to exist.
pub fn is_within(child: &Path, parent: &Path) -> bool {
    let child = normalize(child);
    let parent = normalize(parent);
    child.starts_with(&parent)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_within() {
        assert!(is_within(
            Path::new("/rec/alice/Season 2025-01/x.mp4"),
            Path::new("/rec/alice")
        ));
        assert!(!is_within(
            Path::new("/rec/frank/Season 2025-01"),
            Path::new("/rec/alice")
        ));
        // Traversal does not escape.
        assert!(!is_within(
            Path::new("/rec/alice/../frank/file"),
            Path::new("/rec/alice")
        ));
    }

    #[test]
    fn test_artwork_paths() {
        let root = Path::new("/rec");
        assert_eq!(
            artwork_dir(root, "alice"),
            PathBuf::from("/rec/.media/artwork/alice")
        );
        assert_eq!(
            category_image_path(root, "Just Chatting"),
            PathBuf::from("/rec/.media/categories/Just_Chatting.jpg")
        );
    }

    #[test]
    fn test_season_dir_name() {
        assert_eq!(season_dir_name(2025, 1), "Season 2025-01");
    }
}
