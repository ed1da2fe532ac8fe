use crate::error::ParseError;

pub const HEADER: &str = "#EXTM3U";

pub const TARGET_DURATION: &str = "EXT-X-TARGETDURATION";
pub const MEDIA_SEQUENCE: &str = "EXT-X-MEDIA-SEQUENCE";
pub const END_LIST: &str = "EXT-X-ENDLIST";
pub const INF: &str = "EXTINF";

/// A `#NAME:VALUE` line of the playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl<'a> Directive<'a> {
    /// Splits on the first `:` only, so values may contain colons themselves.
    pub fn parse(line: &'a str) -> Option<Self> {
        let body = line.strip_prefix('#')?;
        let (name, value) = body.split_once(':').unwrap_or((body, ""));
        Some(Self { name, value })
    }

    fn integer(&self) -> Result<u64, ParseError> {
        self.value.trim().parse().map_err(|_| {
            ParseError::MalformedPlaylist(format!(
                "{} expects an integer, got {:?}",
                self.name, self.value
            ))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPlaylist {
    /// Seconds, as declared by `EXT-X-TARGETDURATION`.
    pub target_duration: Option<u64>,
    pub media_sequence: Option<u64>,
    /// Segment uris, exactly as written and in playlist order.
    pub segments: Vec<String>,
    /// `EXT-X-ENDLIST` was present, no more segments will be published.
    pub end_list: bool,
}

/// Parses the text of a media playlist.
///
/// Only the directives needed to follow a live stream are interpreted, every
/// other directive is skipped. A uri is collected only when it follows an
/// `EXTINF` directive.
pub fn parse(text: &str) -> Result<ParsedPlaylist, ParseError> {
    let mut lines = text.lines().map(str::trim).enumerate();

    let Some((_, header)) = lines.next() else {
        return Err(ParseError::EmptyPlaylist);
    };
    if header != HEADER {
        return Err(ParseError::MalformedPlaylist(format!(
            "expected {HEADER} on the first line, found {header:?}"
        )));
    }

    let mut playlist = ParsedPlaylist::default();
    // line number of an EXTINF still waiting for its uri
    let mut pending_inf = None;

    for (index, line) in lines {
        if line.is_empty() {
            continue;
        }

        let Some(directive) = Directive::parse(line) else {
            if pending_inf.take().is_some() {
                playlist.segments.push(line.to_string());
            }
            continue;
        };

        match directive.name {
            TARGET_DURATION => {
                let duration = directive.integer()?;
                playlist.target_duration.get_or_insert(duration);
            }
            MEDIA_SEQUENCE => playlist.media_sequence = Some(directive.integer()?),
            END_LIST => playlist.end_list = true,
            INF => pending_inf = Some(index + 1),
            _ => {}
        }
    }

    if let Some(line) = pending_inf {
        return Err(ParseError::TruncatedPlaylist { line });
    }

    Ok(playlist)
}
