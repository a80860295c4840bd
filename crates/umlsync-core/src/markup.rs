//! Annotation markup.
//!
//! Owns the concrete syntax written into documents: the hash comment, the
//! asset image reference and the collapsible source section, along with the
//! inline attributes a diagram fence may carry.

use std::borrow::Cow;

/// Fence language tags recognized as diagram source.
pub const DIAGRAM_LANGUAGES: &[&str] = &["puml", "plantuml"];

/// File extensions recognized as diagram source files.
pub const SOURCE_EXTENSIONS: &[&str] = &["puml", "plantuml"];

/// Caption used when neither the fence nor a previous annotation provides one.
pub const DEFAULT_CAPTION: &str = "UML";

/// Toggle label used when neither the fence nor a previous annotation provides one.
pub const DEFAULT_TOGGLE: &str = "PlantUML source";

/// Language tag written into regenerated fences.
const CANONICAL_LANGUAGE: &str = "puml";

/// Whether a fence language tag denotes diagram source.
pub(crate) fn is_diagram_language(tag: &str) -> bool {
    DIAGRAM_LANGUAGES
        .iter()
        .any(|lang| lang.eq_ignore_ascii_case(tag))
}

/// Whether an image target points at a diagram source file.
pub(crate) fn is_source_path(target: &str) -> bool {
    target.rsplit_once('.').is_some_and(|(stem, ext)| {
        !stem.is_empty()
            && SOURCE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
    })
}

/// Attributes written after the language tag of a diagram fence.
///
/// Accepts `caption="..."` and `toggle="..."` (double, single or no quotes).
/// Words outside any `key=value` pair form the caption when no explicit
/// `caption` attribute is present, so ```` ```puml Login flow ```` works too.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InlineAttrs {
    /// Caption override for the image alt text.
    pub caption: Option<String>,
    /// Label override for the collapsible section.
    pub toggle: Option<String>,
    /// Attribute keys that are not understood.
    pub unknown: Vec<String>,
}

impl InlineAttrs {
    /// Parse the info string remainder of a fence.
    #[must_use]
    pub fn parse(info: &str) -> Self {
        let mut attrs = Self::default();
        let mut bare: Vec<&str> = Vec::new();
        let mut remaining = info.trim();

        while !remaining.is_empty() {
            if let Some((key, value, rest)) = parse_key_value(remaining) {
                match key {
                    "caption" => attrs.caption = Some(value.to_owned()),
                    "toggle" => attrs.toggle = Some(value.to_owned()),
                    other => attrs.unknown.push(other.to_owned()),
                }
                remaining = rest.trim_start();
            } else {
                let end = remaining
                    .find(char::is_whitespace)
                    .unwrap_or(remaining.len());
                bare.push(&remaining[..end]);
                remaining = remaining[end..].trim_start();
            }
        }

        if attrs.caption.is_none() && !bare.is_empty() {
            attrs.caption = Some(bare.join(" "));
        }
        attrs
    }
}

/// Parse `key="value"`, `key='value'` or `key=value` at the start of `s`.
///
/// Returns the key, the value and the unparsed rest.
fn parse_key_value(s: &str) -> Option<(&str, &str, &str)> {
    let key_len = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(s.len());
    if key_len == 0 {
        return None;
    }
    let (key, after_key) = s.split_at(key_len);
    let after_eq = after_key.strip_prefix('=')?;

    for quote in ['"', '\''] {
        if let Some(stripped) = after_eq.strip_prefix(quote) {
            let end = stripped.find(quote)?;
            return Some((key, &stripped[..end], &stripped[end + 1..]));
        }
    }

    let end = after_eq.find(char::is_whitespace).unwrap_or(after_eq.len());
    Some((key, &after_eq[..end], &after_eq[end..]))
}

/// Pick the first non-blank value: inline override, then stored, then default.
pub(crate) fn resolve<'v>(inline: Option<&'v str>, stored: Option<&'v str>, default: &'v str) -> &'v str {
    let present = |value: &&str| !value.trim().is_empty();
    inline
        .filter(present)
        .or_else(|| stored.filter(present))
        .unwrap_or(default)
}

/// Escape image alt text so brackets and backslashes survive a re-scan.
pub(crate) fn escape_alt(text: &str) -> Cow<'_, str> {
    if !text.contains(['\\', '[', ']']) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 4);
    for c in text.chars() {
        if matches!(c, '\\' | '[' | ']') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

/// Drop the backslash of every escaped punctuation character in alt text.
pub(crate) fn unescape_alt(text: &str) -> Cow<'_, str> {
    if !text.contains('\\') {
        return Cow::Borrowed(text);
    }
    let mut plain = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\'
            && let Some(&next) = chars.peek()
            && next.is_ascii_punctuation()
        {
            plain.push(next);
            chars.next();
        } else {
            plain.push(c);
        }
    }
    Cow::Owned(plain)
}

/// Escape text placed inside an HTML element.
pub(crate) fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>']) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;"),
    )
}

/// Reverse of [`escape_html`].
pub(crate) fn unescape_html(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&"),
    )
}

/// Image target as written into the document.
///
/// Targets containing whitespace, parentheses or angle brackets are wrapped
/// in `<...>`, with any angle brackets percent-encoded.
pub(crate) fn link_target(link: &str) -> Cow<'_, str> {
    let needs_brackets = link.is_empty()
        || link.contains(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '<' | '>'));
    if !needs_brackets {
        return Cow::Borrowed(link);
    }
    Cow::Owned(format!("<{}>", link.replace('<', "%3C").replace('>', "%3E")))
}

fn image_line(caption: &str, asset_link: &str) -> String {
    format!("![{}]({})", escape_alt(caption), link_target(asset_link))
}

/// Inputs for [`annotated_source`].
pub(crate) struct SourceAnnotation<'a> {
    pub hash: &'a str,
    pub caption: &'a str,
    pub toggle: &'a str,
    pub asset_link: &'a str,
    pub fence: &'a str,
    pub info: &'a str,
    pub source: &'a str,
    /// Terminator placed between the generated lines.
    pub line_ending: &'a str,
}

/// Render the full annotated form of a diagram source block.
///
/// The result carries no trailing line break; the line terminator that
/// followed the original block stays in place.
pub(crate) fn annotated_source(a: &SourceAnnotation<'_>) -> String {
    let comment = format!("<!-- puml:{} -->", a.hash);
    let image = image_line(a.caption, a.asset_link);
    let summary = format!("<summary>{}</summary>", escape_html(a.toggle));
    let info = a.info.trim();
    let opening = if info.is_empty() {
        format!("{}{CANONICAL_LANGUAGE}", a.fence)
    } else {
        format!("{}{CANONICAL_LANGUAGE} {info}", a.fence)
    };

    let mut lines = vec![&*comment, &*image, "", "<details>", &*summary, "", &*opening];
    if !a.source.is_empty() {
        lines.push(a.source);
    }
    lines.extend([a.fence, "", "</details>"]);
    lines.join(a.line_ending)
}

/// Render the annotated form of an image reference to a diagram source file.
pub(crate) fn annotated_image(
    hash: &str,
    source_path: &str,
    caption: &str,
    asset_link: &str,
    line_ending: &str,
) -> String {
    format!(
        "<!-- puml:{hash} {source_path} -->{line_ending}{}",
        image_line(caption, asset_link)
    )
}
