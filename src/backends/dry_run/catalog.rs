// SPDX-License-Identifier: GPL-3.0-only

//! Element types known to the dry-run engine
//!
//! Each entry describes the pads an element exposes, the formats they carry
//! and the properties it accepts, which is enough to validate a topology
//! without a media framework.

use super::caps::Caps;

/// Format carried by a pad template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Passes whatever it receives
    Any,
    Media(&'static str),
}

impl Format {
    pub fn caps(self) -> Caps {
        match self {
            Format::Any => Caps::any(),
            Format::Media(media_type) => Caps::media(media_type),
        }
    }
}

/// Source pad availability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrcPads {
    None,
    /// One static pad
    Always(Format),
    /// Pads created on request (`src_%u`)
    Request(Format),
}

/// Property value type and coercion rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    Int { min: i64, max: i64 },
    Bool,
    Str,
    /// Accepts a nick or its index
    Enum(&'static [&'static str]),
    Caps,
}

/// Static description of an element type
#[derive(Debug)]
pub struct ElementSpec {
    pub type_name: &'static str,
    /// Format accepted on the static sink pad, `None` for sources
    pub sink: Option<Format>,
    pub src: SrcPads,
    pub properties: &'static [(&'static str, PropKind)],
}

impl ElementSpec {
    pub fn property(&self, name: &str) -> Option<PropKind> {
        if name == "name" {
            return Some(PropKind::Str);
        }
        self.properties
            .iter()
            .find(|(prop, _)| *prop == name)
            .map(|(_, kind)| *kind)
    }

    pub fn is_splitter(&self) -> bool {
        matches!(self.src, SrcPads::Request(_))
    }

    pub fn src_format(&self) -> Option<Format> {
        match self.src {
            SrcPads::None => None,
            SrcPads::Always(format) | SrcPads::Request(format) => Some(format),
        }
    }
}

const RAW: Format = Format::Media("video/x-raw");
const RTP: Format = Format::Media("application/x-rtp");

const UINT_MAX: i64 = u32::MAX as i64;
const INT_MAX: i64 = i32::MAX as i64;

const LIVE: (&str, PropKind) = ("is-live", PropKind::Bool);
const SYNC: (&str, PropKind) = ("sync", PropKind::Bool);
const PT: (&str, PropKind) = ("pt", PropKind::Int { min: 0, max: 127 });
const CONFIG_INTERVAL: (&str, PropKind) = (
    "config-interval",
    PropKind::Int {
        min: -1,
        max: 3600,
    },
);
const BITRATE: (&str, PropKind) = (
    "bitrate",
    PropKind::Int {
        min: 1,
        max: 2_048_000,
    },
);
const CHANNEL: (&str, PropKind) = ("channel", PropKind::Str);
const CAPS: (&str, PropKind) = ("caps", PropKind::Caps);

const TEST_PATTERNS: &[&str] = &[
    "smpte", "snow", "black", "white", "red", "green", "blue", "checkers-1", "checkers-2",
    "checkers-4", "checkers-8", "circular", "blink", "smpte75", "zone-plate", "gamut",
    "chroma-zone-plate", "solid-color", "ball", "smpte100", "bar", "pinwheel", "spokes",
    "gradient", "colors", "smpte-rp-219",
];

static CATALOG: &[ElementSpec] = &[
    // Sources
    ElementSpec {
        type_name: "fakesrc",
        sink: None,
        src: SrcPads::Always(Format::Any),
        properties: &[
            LIVE,
            ("num-buffers", PropKind::Int { min: -1, max: INT_MAX }),
            ("sizetype", PropKind::Enum(&["empty", "fixed", "random"])),
        ],
    },
    ElementSpec {
        type_name: "videotestsrc",
        sink: None,
        src: SrcPads::Always(RAW),
        properties: &[
            LIVE,
            ("pattern", PropKind::Enum(TEST_PATTERNS)),
            ("num-buffers", PropKind::Int { min: -1, max: INT_MAX }),
        ],
    },
    ElementSpec {
        type_name: "v4l2src",
        sink: None,
        src: SrcPads::Always(RAW),
        properties: &[
            ("device", PropKind::Str),
            ("do-timestamp", PropKind::Bool),
            ("io-mode", PropKind::Enum(&["auto", "rw", "mmap", "userptr", "dmabuf", "dmabuf-import"])),
        ],
    },
    ElementSpec {
        type_name: "appsrc",
        sink: None,
        src: SrcPads::Always(Format::Any),
        properties: &[LIVE, CAPS, ("do-timestamp", PropKind::Bool)],
    },
    ElementSpec {
        type_name: "intervideosrc",
        sink: None,
        src: SrcPads::Always(RAW),
        properties: &[CHANNEL, ("timeout", PropKind::Int { min: 0, max: i64::MAX })],
    },
    // Flow control
    ElementSpec {
        type_name: "tee",
        sink: Some(Format::Any),
        src: SrcPads::Request(Format::Any),
        properties: &[("allow-not-linked", PropKind::Bool)],
    },
    ElementSpec {
        type_name: "queue",
        sink: Some(Format::Any),
        src: SrcPads::Always(Format::Any),
        properties: &[
            ("max-size-buffers", PropKind::Int { min: 0, max: UINT_MAX }),
            ("max-size-time", PropKind::Int { min: 0, max: i64::MAX }),
            ("leaky", PropKind::Enum(&["no", "upstream", "downstream"])),
        ],
    },
    ElementSpec {
        type_name: "valve",
        sink: Some(Format::Any),
        src: SrcPads::Always(Format::Any),
        properties: &[("drop", PropKind::Bool)],
    },
    ElementSpec {
        type_name: "identity",
        sink: Some(Format::Any),
        src: SrcPads::Always(Format::Any),
        properties: &[SYNC],
    },
    ElementSpec {
        type_name: "capsfilter",
        sink: Some(Format::Any),
        src: SrcPads::Always(Format::Any),
        properties: &[CAPS],
    },
    // Raw video processing
    ElementSpec {
        type_name: "videoconvert",
        sink: Some(RAW),
        src: SrcPads::Always(RAW),
        properties: &[],
    },
    ElementSpec {
        type_name: "videoscale",
        sink: Some(RAW),
        src: SrcPads::Always(RAW),
        properties: &[("method", PropKind::Enum(&["nearest-neighbour", "bilinear", "4-tap", "lanczos"]))],
    },
    ElementSpec {
        type_name: "videorate",
        sink: Some(RAW),
        src: SrcPads::Always(RAW),
        properties: &[
            ("max-rate", PropKind::Int { min: 1, max: INT_MAX }),
            ("drop-only", PropKind::Bool),
        ],
    },
    ElementSpec {
        type_name: "vaapipostproc",
        sink: Some(RAW),
        src: SrcPads::Always(RAW),
        properties: &[],
    },
    ElementSpec {
        type_name: "jpegdec",
        sink: Some(Format::Media("image/jpeg")),
        src: SrcPads::Always(RAW),
        properties: &[],
    },
    // Encoders
    ElementSpec {
        type_name: "x264enc",
        sink: Some(RAW),
        src: SrcPads::Always(Format::Media("video/x-h264")),
        properties: &[
            BITRATE,
            ("tune", PropKind::Str),
            ("speed-preset", PropKind::Enum(&[
                "none", "ultrafast", "superfast", "veryfast", "faster", "fast", "medium", "slow",
                "slower", "veryslow", "placebo",
            ])),
            ("key-int-max", PropKind::Int { min: 0, max: INT_MAX }),
        ],
    },
    ElementSpec {
        type_name: "vaapih264enc",
        sink: Some(RAW),
        src: SrcPads::Always(Format::Media("video/x-h264")),
        properties: &[BITRATE],
    },
    ElementSpec {
        type_name: "theoraenc",
        sink: Some(RAW),
        src: SrcPads::Always(Format::Media("video/x-theora")),
        properties: &[BITRATE, ("quality", PropKind::Int { min: 0, max: 63 })],
    },
    ElementSpec {
        type_name: "fakeenc",
        sink: Some(Format::Any),
        src: SrcPads::Always(Format::Media("video/x-fake")),
        properties: &[BITRATE],
    },
    // Payloaders
    ElementSpec {
        type_name: "rtph264pay",
        sink: Some(Format::Media("video/x-h264")),
        src: SrcPads::Always(RTP),
        properties: &[PT, CONFIG_INTERVAL],
    },
    ElementSpec {
        type_name: "rtptheorapay",
        sink: Some(Format::Media("video/x-theora")),
        src: SrcPads::Always(RTP),
        properties: &[PT, CONFIG_INTERVAL],
    },
    ElementSpec {
        type_name: "fakepay",
        sink: Some(Format::Any),
        src: SrcPads::Always(RTP),
        properties: &[PT],
    },
    // Sinks
    ElementSpec {
        type_name: "fakesink",
        sink: Some(Format::Any),
        src: SrcPads::None,
        properties: &[SYNC],
    },
    ElementSpec {
        type_name: "appsink",
        sink: Some(Format::Any),
        src: SrcPads::None,
        properties: &[SYNC, CAPS],
    },
    ElementSpec {
        type_name: "aasink",
        sink: Some(RAW),
        src: SrcPads::None,
        properties: &[SYNC],
    },
    ElementSpec {
        type_name: "autovideosink",
        sink: Some(RAW),
        src: SrcPads::None,
        properties: &[SYNC],
    },
    ElementSpec {
        type_name: "intervideosink",
        sink: Some(RAW),
        src: SrcPads::None,
        properties: &[CHANNEL, SYNC],
    },
];

/// Look up an element type
pub fn lookup(type_name: &str) -> Option<&'static ElementSpec> {
    CATALOG.iter().find(|spec| spec.type_name == type_name)
}

/// All known element type names
pub fn type_names() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|spec| spec.type_name)
}

/// Coerce a string to a property's type, returning the normalised value
pub fn coerce(kind: PropKind, value: &str) -> Result<String, String> {
    let value = value.trim();
    match kind {
        PropKind::Str => Ok(value.to_string()),
        PropKind::Bool => match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok("true".to_string()),
            "false" | "no" | "0" => Ok("false".to_string()),
            _ => Err(format!("\"{}\" is not a boolean", value)),
        },
        PropKind::Int { min, max } => {
            let parsed: i64 = value
                .parse()
                .map_err(|_| format!("\"{}\" is not an integer", value))?;
            if parsed < min || parsed > max {
                return Err(format!("{} is outside {}..={}", parsed, min, max));
            }
            Ok(parsed.to_string())
        }
        PropKind::Enum(nicks) => {
            if let Some(nick) = nicks.iter().find(|nick| **nick == value) {
                return Ok(nick.to_string());
            }
            value
                .parse::<usize>()
                .ok()
                .and_then(|index| nicks.get(index))
                .map(|nick| nick.to_string())
                .ok_or_else(|| format!("\"{}\" is not one of {}", value, nicks.join(", ")))
        }
        PropKind::Caps => value
            .parse::<Caps>()
            .map(|caps| caps.to_string())
            .map_err(|e| format!("invalid caps: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert!(lookup("tee").is_some_and(ElementSpec::is_splitter));
        assert!(lookup("queue").is_some_and(|spec| !spec.is_splitter()));
        assert!(lookup("no-such-element").is_none());
        assert!(type_names().any(|name| name == "intervideosink"));
    }

    #[test]
    fn test_coerce_bool() {
        assert_eq!(coerce(PropKind::Bool, "TRUE").unwrap(), "true");
        assert_eq!(coerce(PropKind::Bool, "0").unwrap(), "false");
        assert!(coerce(PropKind::Bool, "maybe").is_err());
    }

    #[test]
    fn test_coerce_int_range() {
        let pt = PropKind::Int { min: 0, max: 127 };
        assert_eq!(coerce(pt, "96").unwrap(), "96");
        assert!(coerce(pt, "128").is_err());
        assert!(coerce(pt, "ninety-six").is_err());
    }

    #[test]
    fn test_coerce_enum_by_nick_or_index() {
        assert_eq!(coerce(PropKind::Enum(TEST_PATTERNS), "ball").unwrap(), "ball");
        assert_eq!(coerce(PropKind::Enum(TEST_PATTERNS), "18").unwrap(), "ball");
        assert!(coerce(PropKind::Enum(TEST_PATTERNS), "99").is_err());
    }

    #[test]
    fn test_every_element_has_name_property() {
        for name in type_names() {
            let spec = lookup(name).unwrap();
            assert_eq!(spec.property("name"), Some(PropKind::Str));
        }
    }
}
