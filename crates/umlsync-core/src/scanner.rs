//! Block scanner and classifier.
//!
//! Splits a markdown document into verbatim text and typed diagram blocks.
//! Scanning is line oriented: at every line start the rules in [`RULES`] are
//! tried in priority order and the first match wins. Rules look ahead at most
//! one block. A fence that never closes swallows the rest of the document as
//! verbatim text, and an indented example that never closes ends with its
//! indented run, so no line is examined more than a few times.
//!
//! Fenced blocks of other languages are skipped as verbatim text, which keeps
//! diagram-looking examples inside them untouched.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::markup::{is_diagram_language, is_source_path};

static ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}<!--\s*puml:(\S+?)(?:\s+(\S.*?))?\s*-->\s*$").unwrap()
});

/// Alt text may contain backslash escapes and one level of balanced
/// brackets. The target is either bare or wrapped in angle brackets.
static IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^ {0,3}!\[((?:\\.|[^\\\[\]]|\[(?:\\.|[^\\\[\]])*\])*)\]",
        r"\(\s*(?:<([^<>\r\n]*)>|([^()\s<][^()\s]*))\s*\)\s*$",
    ))
    .unwrap()
});

static FENCE_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(`{3,}|~{3,})[ \t]*([^\s`]*)[ \t]*(.*?)\s*$").unwrap()
});

static DETAILS_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}<details(?:\s[^>]*)?>\s*(?:<summary>(.*?)</summary>\s*)?$").unwrap()
});

static SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}<summary>(.*?)</summary>\s*$").unwrap());

static DETAILS_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}</details>\s*$").unwrap());

/// A piece of a scanned document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Text that is not part of any diagram block, passed through verbatim.
    Text(&'a str),
    /// A classified diagram block.
    Block(Block<'a>),
}

/// A classified diagram region of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'a> {
    /// Byte range of the block in the document. Excludes the final line break.
    pub span: Range<usize>,
    /// The matched text.
    pub text: &'a str,
    /// Terminator of the block's first line, or the document's dominant one
    /// when that line is the last.
    pub line_ending: &'static str,
    /// Kind-specific fields.
    pub kind: BlockKind<'a>,
}

/// The kinds of diagram blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind<'a> {
    /// A fenced diagram block that has never been reconciled.
    RawSource(FencedSource<'a>),
    /// A previously generated hash comment, image and collapsible source section.
    AnnotatedSource(AnnotatedSource<'a>),
    /// An image reference whose target is a diagram source file.
    RawImage(RawImage<'a>),
    /// A previously generated hash comment followed by an asset image reference.
    AnnotatedImage(AnnotatedImage<'a>),
    /// An indented diagram form kept as a usage example.
    Literal,
}

/// A diagram fence and its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedSource<'a> {
    /// The opening fence characters (e.g. "```").
    pub fence: &'a str,
    /// Info string after the language tag.
    pub info: &'a str,
    /// Body between the fences without trailing line breaks.
    pub source: &'a str,
}

/// Fields of an annotated source block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedSource<'a> {
    /// Hash recorded in the annotation comment (not validated).
    pub stored_hash: &'a str,
    /// Image alt text as written, backslash escapes included.
    pub caption: &'a str,
    /// Image target.
    pub asset_link: &'a str,
    /// Summary text of the collapsible section as written, HTML-escaped.
    pub toggle: &'a str,
    /// The embedded diagram fence.
    pub body: FencedSource<'a>,
}

/// Fields of a raw image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage<'a> {
    /// Image alt text as written.
    pub caption: &'a str,
    /// Path of the diagram source file, relative to the document.
    pub path: &'a str,
}

/// Fields of an annotated image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedImage<'a> {
    /// Hash recorded in the annotation comment (not validated).
    pub stored_hash: &'a str,
    /// Diagram source file recorded in the annotation comment.
    pub source_path: Option<&'a str>,
    /// Image alt text as written.
    pub caption: &'a str,
    /// Image target.
    pub asset_link: &'a str,
}

/// Scan `src` into an ordered, non-overlapping sequence of segments.
///
/// Concatenating the text of every segment reproduces `src` exactly.
#[must_use]
pub fn scan(src: &str) -> Scanner<'_> {
    Scanner {
        src,
        line_ending: if src.contains("\r\n") { "\r\n" } else { "\n" },
        pos: 0,
        text_start: 0,
        pending: None,
    }
}

/// Lazy iterator over the segments of a document. Created by [`scan`].
#[derive(Debug)]
pub struct Scanner<'a> {
    src: &'a str,
    /// Terminator used for blocks on an unterminated last line.
    line_ending: &'static str,
    /// Start of the next line to classify.
    pos: usize,
    /// Start of verbatim text not yet emitted.
    text_start: usize,
    /// Block found after a run of verbatim text.
    pending: Option<Block<'a>>,
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Segment<'a>> {
        if let Some(block) = self.pending.take() {
            return Some(Segment::Block(block));
        }

        while self.pos < self.src.len() {
            let start = self.pos;
            if let Some(found) = RULES.iter().find_map(|rule| rule(self.src, start)) {
                let block = Block {
                    span: start..found.end,
                    text: &self.src[start..found.end],
                    line_ending: self.line_ending_at(start),
                    kind: found.kind,
                };
                let before = &self.src[self.text_start..start];
                self.pos = found.next;
                self.text_start = found.end;
                if before.is_empty() {
                    return Some(Segment::Block(block));
                }
                self.pending = Some(block);
                return Some(Segment::Text(before));
            }
            self.pos = skip_fence(self.src, start).unwrap_or_else(|| line_at(self.src, start).next);
        }

        if self.text_start < self.src.len() {
            let rest = &self.src[self.text_start..];
            self.text_start = self.src.len();
            return Some(Segment::Text(rest));
        }
        None
    }
}

impl Scanner<'_> {
    fn line_ending_at(&self, start: usize) -> &'static str {
        let line = line_at(self.src, start);
        match &self.src[line.end..line.next] {
            "\r\n" => "\r\n",
            "\n" => "\n",
            _ => self.line_ending,
        }
    }
}

/// Result of a successful rule.
struct Match<'a> {
    kind: BlockKind<'a>,
    /// End of the block's last line, excluding its terminator.
    end: usize,
    /// Start of the line after the block.
    next: usize,
}

type Rule = for<'a> fn(&'a str, usize) -> Option<Match<'a>>;

/// Classification rules in priority order.
///
/// Literal exclusion comes first so an indented example is never processed.
/// Annotated forms come before raw forms so a generated region is recognized
/// as a whole instead of re-annotating the fence embedded in it.
const RULES: &[Rule] = &[
    literal,
    annotated_source,
    annotated_image,
    raw_image,
    raw_source,
];

/// A single line of the document.
#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    /// Line content without its terminator.
    text: &'a str,
    start: usize,
    /// End of the content, excluding the terminator.
    end: usize,
    /// Start of the following line.
    next: usize,
}

fn line_at(src: &str, start: usize) -> Line<'_> {
    let rest = &src[start..];
    let (raw, next) = match rest.find('\n') {
        Some(i) => (&rest[..i], start + i + 1),
        None => (rest, src.len()),
    };
    let text = raw.strip_suffix('\r').unwrap_or(raw);
    Line {
        text,
        start,
        end: start + text.len(),
        next,
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn at(src: &'a str, pos: usize) -> Self {
        Self { src, pos }
    }

    fn next_line(&mut self) -> Option<Line<'a>> {
        if self.pos >= self.src.len() {
            return None;
        }
        let line = line_at(self.src, self.pos);
        self.pos = line.next;
        Some(line)
    }

    /// Next line that is not blank.
    fn next_content_line(&mut self) -> Option<Line<'a>> {
        loop {
            let line = self.next_line()?;
            if !line.text.trim().is_empty() {
                return Some(line);
            }
        }
    }
}

struct FenceOpen<'a> {
    fence: &'a str,
    lang: &'a str,
    info: &'a str,
}

fn fence_open(line: &str) -> Option<FenceOpen<'_>> {
    let caps = FENCE_OPEN.captures(line)?;
    let fence = caps.get(1)?.as_str();
    let info = caps.get(3).map_or("", |m| m.as_str());
    // A backtick in the info string makes the line inline code, not a fence.
    if fence.starts_with('`') && info.contains('`') {
        return None;
    }
    Some(FenceOpen {
        fence,
        lang: caps.get(2).map_or("", |m| m.as_str()),
        info,
    })
}

/// Alt text and target of an image reference line.
fn image_ref(line: &str) -> Option<(&str, &str)> {
    let caps = IMAGE.captures(line)?;
    let target = caps.get(2).or_else(|| caps.get(3))?.as_str();
    Some((caps.get(1).map_or("", |m| m.as_str()), target))
}

fn is_fence_close(line: &str, fence: &str) -> bool {
    let Some(&marker) = fence.as_bytes().first() else {
        return false;
    };
    let trimmed = line.trim();
    trimmed.len() >= fence.len() && trimmed.bytes().all(|b| b == marker)
}

/// Find the closing fence for a body starting at `body_start`.
///
/// Returns the body without trailing line breaks and the closing line.
fn read_fence<'a>(src: &'a str, body_start: usize, fence: &str) -> Option<(&'a str, Line<'a>)> {
    let mut cursor = Cursor::at(src, body_start);
    while let Some(line) = cursor.next_line() {
        if is_fence_close(line.text, fence) {
            let body = src[body_start..line.start].trim_end_matches(['\r', '\n']);
            return Some((body, line));
        }
    }
    None
}

/// If a fence opens at `start`, return where scanning resumes after it.
///
/// An unclosed fence runs to the end of the document.
fn skip_fence(src: &str, start: usize) -> Option<usize> {
    let line = line_at(src, start);
    let open = fence_open(line.text)?;
    Some(read_fence(src, line.next, open.fence).map_or(src.len(), |(_, close)| close.next))
}

/// Strip the indentation that turns a line into an indented code block.
fn dedent(text: &str) -> Option<&str> {
    text.strip_prefix('\t').or_else(|| text.strip_prefix("    "))
}

/// Last line of an indented diagram fence opened by `open`.
///
/// That is the closing fence, or the last non-blank line of the indented run
/// when the fence never closes.
fn indented_fence_end<'a>(src: &'a str, open: Line<'a>, fence: &str) -> Line<'a> {
    let mut cursor = Cursor::at(src, open.next);
    let mut last = open;
    while let Some(line) = cursor.next_content_line() {
        let indented = dedent(line.text).is_some();
        let closes = is_fence_close(line.text, fence);
        if indented || closes {
            last = line;
        }
        if closes || !indented {
            break;
        }
    }
    last
}

fn literal(src: &str, start: usize) -> Option<Match<'_>> {
    let line = line_at(src, start);
    let dedented = dedent(line.text)?.trim_start();

    if let Some(open) = fence_open(dedented)
        && is_diagram_language(open.lang)
    {
        let last = indented_fence_end(src, line, open.fence);
        return Some(Match {
            kind: BlockKind::Literal,
            end: last.end,
            next: last.next,
        });
    }

    let is_image_of_source =
        || image_ref(dedented).is_some_and(|(_, target)| is_source_path(target));
    if ANNOTATION.is_match(dedented) || is_image_of_source() {
        return Some(Match {
            kind: BlockKind::Literal,
            end: line.end,
            next: line.next,
        });
    }
    None
}

fn annotated_source(src: &str, start: usize) -> Option<Match<'_>> {
    let mut cursor = Cursor::at(src, start);

    let comment = ANNOTATION.captures(cursor.next_line()?.text)?;
    if comment.get(2).is_some() {
        // A source path marks the image reference form.
        return None;
    }
    let stored_hash = comment.get(1)?.as_str();

    let (caption, asset_link) = image_ref(cursor.next_content_line()?.text)?;

    let details = DETAILS_OPEN.captures(cursor.next_content_line()?.text)?;
    let toggle = match details.get(1) {
        Some(inline) => inline.as_str(),
        None => SUMMARY
            .captures(cursor.next_content_line()?.text)?
            .get(1)?
            .as_str(),
    };

    let open_line = cursor.next_content_line()?;
    let open = fence_open(open_line.text)?;
    if !is_diagram_language(open.lang) {
        return None;
    }
    let (source, close) = read_fence(src, open_line.next, open.fence)?;
    cursor.pos = close.next;

    let end_line = cursor.next_content_line()?;
    if !DETAILS_CLOSE.is_match(end_line.text) {
        return None;
    }

    Some(Match {
        kind: BlockKind::AnnotatedSource(AnnotatedSource {
            stored_hash,
            caption,
            asset_link,
            toggle,
            body: FencedSource {
                fence: open.fence,
                info: open.info,
                source,
            },
        }),
        end: end_line.end,
        next: end_line.next,
    })
}

fn annotated_image(src: &str, start: usize) -> Option<Match<'_>> {
    let mut cursor = Cursor::at(src, start);

    let comment = ANNOTATION.captures(cursor.next_line()?.text)?;
    let stored_hash = comment.get(1)?.as_str();
    let source_path = comment.get(2).map(|m| m.as_str());

    let image_line = cursor.next_content_line()?;
    let (caption, asset_link) = image_ref(image_line.text)?;
    if is_source_path(asset_link) {
        return None;
    }

    Some(Match {
        kind: BlockKind::AnnotatedImage(AnnotatedImage {
            stored_hash,
            source_path,
            caption,
            asset_link,
        }),
        end: image_line.end,
        next: image_line.next,
    })
}

fn raw_image(src: &str, start: usize) -> Option<Match<'_>> {
    let line = line_at(src, start);
    let (caption, path) = image_ref(line.text)?;
    if !is_source_path(path) {
        return None;
    }

    Some(Match {
        kind: BlockKind::RawImage(RawImage {
            caption,
            path,
        }),
        end: line.end,
        next: line.next,
    })
}

fn raw_source(src: &str, start: usize) -> Option<Match<'_>> {
    let line = line_at(src, start);
    let open = fence_open(line.text)?;
    if !is_diagram_language(open.lang) {
        return None;
    }
    let (source, close) = read_fence(src, line.next, open.fence)?;

    Some(Match {
        kind: BlockKind::RawSource(FencedSource {
            fence: open.fence,
            info: open.info,
            source,
        }),
        end: close.end,
        next: close.next,
    })
}
