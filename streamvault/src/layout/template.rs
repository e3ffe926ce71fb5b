//! Filename template rendering.
//!
//! Templates substitute `{streamer}`, `{title}`, `{game}`, `{year}`,
//! `{month}`, `{day}`, `{hour}`, `{minute}` and `{episode}` (the latter
//! with optional `:02d`-style zero padding). `/` separates
//! subdirectories; every segment is sanitised independently.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Timelike, Utc};
use regex::Regex;

use crate::{Error, Result};

/// Inputs for template substitution.
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub streamer: &'a str,
    pub title: &'a str,
    pub game: &'a str,
    pub episode: i64,
    /// Timestamp the time variables are derived from (UTC).
    pub now: DateTime<Utc>,
}

/// Known-safe preset templates.
const PRESETS: &[(&str, &str)] = &[
    (
        "default",
        "{streamer}/Season {year}-{month}/{streamer} - S{year}{month}E{episode:02d} - {title}",
    ),
    (
        "plex",
        "{streamer}/Season {year}-{month}/{streamer} - S{year}{month}E{episode:02d} - {title}",
    ),
    (
        "emby",
        "{streamer}/Season {year}-{month}/{streamer} - S{year}{month}E{episode:02d} - {title}",
    ),
    (
        "jellyfin",
        "{streamer}/Season {year}-{month}/{streamer} - S{year}{month}E{episode:02d} - {title}",
    ),
    (
        "kodi",
        "{streamer}/Season {year}-{month}/{streamer} - S{year}{month}E{episode:02d} - {title}",
    ),
    (
        "chronological",
        "{year}/{month}/{day}/{streamer} - {title}",
    ),
];

/// Resolve a preset name to its template, or return the input unchanged
/// when it already is a template.
pub fn resolve_preset(name_or_template: &str) -> &str {
    PRESETS
        .iter()
        .find(|(name, _)| *name == name_or_template)
        .map(|(_, template)| *template)
        .unwrap_or(name_or_template)
}

/// Render a template into a relative path.
///
/// Fails with a configuration error on unknown variables so template
/// typos surface when settings are written, not at capture time.
pub fn render_template(template: &str, ctx: &TemplateContext<'_>) -> Result<String> {
    let template = resolve_preset(template);
    let mut out = String::with_capacity(template.len() + 32);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }

        let mut var = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            var.push(c);
        }
        if !closed {
            return Err(Error::config(format!(
                "unterminated variable in filename template: {{{var}"
            )));
        }

        let (name, padding) = match var.split_once(':') {
            Some((name, spec)) => (name, Some(parse_padding(spec)?)),
            None => (var.as_str(), None),
        };

        let value = match name {
            "streamer" => ctx.streamer.to_string(),
            "title" => ctx.title.to_string(),
            "game" => ctx.game.to_string(),
            "year" => format!("{:04}", ctx.now.year()),
            "month" => format!("{:02}", ctx.now.month()),
            "day" => format!("{:02}", ctx.now.day()),
            "hour" => format!("{:02}", ctx.now.hour()),
            "minute" => format!("{:02}", ctx.now.minute()),
            "episode" => ctx.episode.to_string(),
            other => {
                return Err(Error::config(format!(
                    "unknown filename template variable: {{{other}}}"
                )));
            }
        };

        match padding {
            Some(width) => {
                let mut padded = value;
                while padded.len() < width {
                    padded.insert(0, '0');
                }
                out.push_str(&padded);
            }
            None => out.push_str(&value),
        }
    }

    // Sanitise each path segment independently; drop segments that
    // sanitise to nothing.
    let rendered = out
        .split('/')
        .map(sanitize_segment)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    if rendered.is_empty() {
        return Err(Error::config(format!(
            "filename template rendered to an empty path: {template}"
        )));
    }
    Ok(rendered)
}

/// Parse a `02d`-style padding spec.
fn parse_padding(spec: &str) -> Result<usize> {
    let digits = spec.strip_suffix('d').unwrap_or(spec);
    digits
        .parse::<usize>()
        .map_err(|_| Error::config(format!("invalid padding spec in filename template: :{spec}")))
}

/// Characters illegal on POSIX or NTFS (plus control characters), as a
/// run so consecutive offenders collapse into one replacement.
static ILLEGAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]+"#).expect("valid sanitiser pattern"));

static UNDERSCORE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{2,}").expect("valid underscore pattern"));

/// Replace characters illegal on POSIX or NTFS with `_`, collapse runs
/// of `_`, and trim separators and NTFS-hostile trailing dots/spaces.
pub fn sanitize_segment(segment: &str) -> String {
    let replaced = ILLEGAL_CHARS.replace_all(segment, "_");
    let collapsed = UNDERSCORE_RUNS.replace_all(&replaced, "_");
    collapsed
        .trim_matches(|c: char| c == '_' || c == '.' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx(now: DateTime<Utc>) -> TemplateContext<'static> {
        TemplateContext {
            streamer: "alice",
            title: "Speedrun: round 2?",
            game: "Tetris",
            episode: 1,
            now,
        }
    }

    #[test]
    fn test_default_preset_matches_layout() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap();
        let rendered = render_template("default", &ctx(now)).unwrap();
        assert_eq!(
            rendered,
            "alice/Season 2025-01/alice - S202501E01 - Speedrun_ round 2"
        );
    }

    #[test]
    fn test_chronological_preset() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 0).unwrap();
        let rendered = render_template("chronological", &ctx(now)).unwrap();
        assert_eq!(rendered, "2025/12/31/alice - Speedrun_ round 2");
    }

    #[test]
    fn test_episode_padding() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap();
        let mut c = ctx(now);
        c.episode = 7;
        assert_eq!(
            render_template("{episode:03d}", &c).unwrap(),
            "007"
        );
        c.episode = 1234;
        assert_eq!(render_template("{episode:02d}", &c).unwrap(), "1234");
    }

    #[test]
    fn test_unknown_variable_rejected() {
        let now = Utc::now();
        assert!(render_template("{bogus}", &ctx(now)).is_err());
        assert!(render_template("{title", &ctx(now)).is_err());
    }

    #[test]
    fn test_sanitize_collapses_and_trims() {
        assert_eq!(sanitize_segment("a<>b::c"), "a_b_c");
        assert_eq!(sanitize_segment("__name__"), "name");
        assert_eq!(sanitize_segment("trailing dot."), "trailing dot");
        assert_eq!(sanitize_segment("a***b"), "a_b");
    }

    #[test]
    fn test_segments_sanitised_independently() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap();
        let c = TemplateContext {
            streamer: "a/b",
            title: "t",
            game: "g",
            episode: 1,
            now,
        };
        // The slash inside {streamer} is data, not a separator.
        assert_eq!(render_template("{streamer}/{title}", &c).unwrap(), "a_b/t");
    }
}
