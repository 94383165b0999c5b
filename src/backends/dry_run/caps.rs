// SPDX-License-Identifier: GPL-3.0-only

//! Caps expressions for the dry-run engine
//!
//! Supports the single-structure subset of the GStreamer caps syntax used in
//! topology files: `media/type(feature:x), field=value, field=(type)value`,
//! plus `ANY`. Fixed values are compared literally. Ranges (`[ a, b ]`) and
//! lists (`{ a, b }`) are kept verbatim and treated as compatible with any
//! value of the same field.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A parsed format constraint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Caps {
    /// `None` means ANY
    media_type: Option<String>,
    /// Caps features such as `memory:VASurface`
    features: Vec<String>,
    fields: BTreeMap<String, String>,
}

impl Caps {
    /// Caps accepting every format
    pub fn any() -> Self {
        Self::default()
    }

    /// Caps with a media type and no fields
    pub fn media(media_type: &str) -> Self {
        Self {
            media_type: Some(media_type.to_string()),
            ..Self::default()
        }
    }

    pub fn is_any(&self) -> bool {
        self.media_type.is_none()
    }

    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Set or replace a field
    pub fn set_field(&mut self, name: &str, value: &str) {
        self.fields.insert(name.to_string(), value.to_string());
    }

    /// Whether a format satisfying both constraints exists
    pub fn can_intersect(&self, other: &Caps) -> bool {
        let (Some(a), Some(b)) = (&self.media_type, &other.media_type) else {
            return true;
        };
        if a != b || self.features != other.features {
            return false;
        }
        self.fields.iter().all(|(key, value)| {
            other
                .fields
                .get(key)
                .is_none_or(|v| v == value || is_set(v) || is_set(value))
        })
    }

    /// The narrower of two intersecting constraints
    pub fn intersect(&self, other: &Caps) -> Option<Caps> {
        if !self.can_intersect(other) {
            return None;
        }
        let media_type = self.media_type.clone().or_else(|| other.media_type.clone());
        let features = if self.media_type.is_some() {
            self.features.clone()
        } else {
            other.features.clone()
        };
        let mut fields = self.fields.clone();
        for (key, value) in &other.fields {
            match fields.get_mut(key) {
                // A fixed value narrows a range or list
                Some(mine) if is_set(mine) && !is_set(value) => *mine = value.clone(),
                Some(_) => {}
                None => {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }
        Some(Caps {
            media_type,
            features,
            fields,
        })
    }
}

impl FromStr for Caps {
    type Err = String;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err("empty caps expression".to_string());
        }
        if expression == "ANY" {
            return Ok(Caps::any());
        }
        if expression.contains(';') {
            return Err("multiple structures are not supported".to_string());
        }

        let mut parts = split_top_level(expression)?.into_iter();
        let head = parts.next().unwrap_or_default();
        let (media_type, features) = split_features(head)?;
        if !is_media_type(media_type) {
            return Err(format!("invalid media type \"{}\"", media_type));
        }

        let mut fields = BTreeMap::new();
        for part in parts {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| format!("field \"{}\" has no value", part))?;
            let key = key.trim();
            if key.is_empty()
                || !key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(format!("invalid field name \"{}\"", key));
            }
            let value = strip_type_annotation(value.trim());
            if value.is_empty() {
                return Err(format!("field \"{}\" has an empty value", key));
            }
            if fields.insert(key.to_string(), value.to_string()).is_some() {
                return Err(format!("field \"{}\" is repeated", key));
            }
        }

        Ok(Caps {
            media_type: Some(media_type.to_string()),
            features,
            fields,
        })
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.media_type {
            None => write!(f, "ANY"),
            Some(media_type) => {
                write!(f, "{}", media_type)?;
                if !self.features.is_empty() {
                    write!(f, "({})", self.features.join(", "))?;
                }
                for (key, value) in &self.fields {
                    write!(f, ", {}={}", key, value)?;
                }
                Ok(())
            }
        }
    }
}

/// Split on commas outside of brackets, braces and parentheses
fn split_top_level(expression: &str) -> Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut depth = Vec::new();
    let mut start = 0;
    for (i, c) in expression.char_indices() {
        match c {
            '[' => depth.push(']'),
            '{' => depth.push('}'),
            '(' => depth.push(')'),
            ']' | '}' | ')' => {
                if depth.pop() != Some(c) {
                    return Err(format!("unbalanced \"{}\"", c));
                }
            }
            ',' if depth.is_empty() => {
                parts.push(expression[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if let Some(open) = depth.last() {
        return Err(format!("missing \"{}\"", open));
    }
    parts.push(expression[start..].trim());
    Ok(parts)
}

/// `video/x-raw(memory:VASurface)` → media type and features
fn split_features(head: &str) -> Result<(&str, Vec<String>), String> {
    let Some((media_type, rest)) = head.split_once('(') else {
        return Ok((head, Vec::new()));
    };
    let inner = rest
        .strip_suffix(')')
        .ok_or_else(|| format!("invalid caps features in \"{}\"", head))?;
    let features: Vec<String> = inner.split(',').map(|f| f.trim().to_string()).collect();
    if features.iter().any(|f| f.is_empty() || f.contains(['(', ')'])) {
        return Err(format!("invalid caps features in \"{}\"", head));
    }
    Ok((media_type.trim(), features))
}

/// Range or list value
fn is_set(value: &str) -> bool {
    value.starts_with('[') || value.starts_with('{')
}

fn is_media_type(s: &str) -> bool {
    let Some((kind, subtype)) = s.split_once('/') else {
        return false;
    };
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '+' | '_'))
    };
    valid(kind) && valid(subtype)
}

/// `(int)640` → `640`
fn strip_type_annotation(value: &str) -> &str {
    if value.starts_with('(')
        && let Some(end) = value.find(')')
    {
        return value[end + 1..].trim();
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_caps() {
        let caps: Caps = "video/x-raw,width=640,height=480,framerate=15/1"
            .parse()
            .unwrap();
        assert_eq!(caps.media_type(), Some("video/x-raw"));
        assert_eq!(caps.field("width"), Some("640"));
        assert_eq!(caps.field("framerate"), Some("15/1"));
    }

    #[test]
    fn test_type_annotations_are_ignored() {
        let annotated: Caps = "video/x-raw, width=(int)640".parse().unwrap();
        let plain: Caps = "video/x-raw,width=640".parse().unwrap();
        assert_eq!(annotated, plain);
    }

    #[test]
    fn test_rejects_malformed_expressions() {
        assert!("".parse::<Caps>().is_err());
        assert!("video".parse::<Caps>().is_err());
        assert!("video/x-raw,width".parse::<Caps>().is_err());
        assert!("video/x-raw,width=".parse::<Caps>().is_err());
        assert!("video/x-raw,width=1,width=2".parse::<Caps>().is_err());
        assert!("video/x-raw;audio/x-raw".parse::<Caps>().is_err());
    }

    #[test]
    fn test_intersection() {
        let raw = Caps::media("video/x-raw");
        let vga: Caps = "video/x-raw,width=640".parse().unwrap();
        let hd: Caps = "video/x-raw,width=1280".parse().unwrap();
        let h264 = Caps::media("video/x-h264");

        assert!(raw.can_intersect(&vga));
        assert!(!vga.can_intersect(&hd));
        assert!(!raw.can_intersect(&h264));
        assert!(Caps::any().can_intersect(&h264));
        assert_eq!(raw.intersect(&vga), Some(vga.clone()));
    }

    #[test]
    fn test_ranges_and_lists_stay_whole() {
        let caps: Caps = "video/x-raw,framerate=[ 1/1, 30/1 ],format={ I420, NV12 },width=640"
            .parse()
            .unwrap();
        assert_eq!(caps.field("framerate"), Some("[ 1/1, 30/1 ]"));
        assert_eq!(caps.field("format"), Some("{ I420, NV12 }"));
        assert_eq!(caps.field("width"), Some("640"));

        let fixed: Caps = "video/x-raw,framerate=15/1".parse().unwrap();
        assert!(caps.can_intersect(&fixed));
        let narrowed = caps.intersect(&fixed).unwrap();
        assert_eq!(narrowed.field("framerate"), Some("15/1"));
        assert_eq!(narrowed.field("format"), Some("{ I420, NV12 }"));

        assert!("video/x-raw,framerate=[ 1/1, 30/1".parse::<Caps>().is_err());
        assert!("video/x-raw,format=I420 }".parse::<Caps>().is_err());
    }

    #[test]
    fn test_caps_features() {
        let caps: Caps = "video/x-raw(memory:VASurface),width=640".parse().unwrap();
        assert_eq!(caps.media_type(), Some("video/x-raw"));
        assert_eq!(caps.features(), ["memory:VASurface".to_string()]);
        assert_eq!(caps.field("width"), Some("640"));

        let system: Caps = "video/x-raw,width=640".parse().unwrap();
        assert!(!caps.can_intersect(&system));
        assert!(caps.can_intersect(&Caps::any()));

        let reparsed: Caps = caps.to_string().parse().unwrap();
        assert_eq!(caps, reparsed);
    }

    #[test]
    fn test_display_round_trip() {
        let caps: Caps = "video/x-raw,width=640,height=480".parse().unwrap();
        let reparsed: Caps = caps.to_string().parse().unwrap();
        assert_eq!(caps, reparsed);
        assert_eq!(Caps::any().to_string(), "ANY");
    }
}
