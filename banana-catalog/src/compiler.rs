use crate::compiled::{CompiledElement, Part, Tag};
use crate::error::CompileError;

/// Kind of an angle-bracket token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    SelfClosing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TagToken {
    kind: TagKind,
    index: u32,
}

/// A parser for the placeholder and tag markers used in catalog strings.
///
/// The grammar is intentionally tiny:
///
/// - `{n}` is a positional placeholder
/// - `<n>...</n>` wraps a span with tag `n`
/// - `<n/>` is an empty tag
///
/// Anything else, including a lone `{` or `<`, is literal text.
pub struct Parser<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Parser { input, position: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// Consumes the current character and advances the position.
    /// Returns the character that was consumed, or None if at the end of input.
    fn consume(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn parse_index(&self, digits: &str, offset: usize) -> Result<u32, CompileError> {
        digits
            .parse::<u32>()
            .map_err(|_| CompileError::IndexOverflow { offset })
    }

    /// Parses `{n}` at the current position. Leaves the position untouched and returns
    /// `None` when the brace does not start a placeholder.
    fn parse_placeholder(&mut self) -> Result<Option<u32>, CompileError> {
        let start = self.position;
        let rest = &self.input[start + 1..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || rest.as_bytes().get(digits) != Some(&b'}') {
            return Ok(None);
        }
        let index = self.parse_index(&rest[..digits], start)?;
        self.position = start + 1 + digits + 1;
        Ok(Some(index))
    }

    /// Parses `<n>`, `</n>` or `<n/>` at the current position. Leaves the position
    /// untouched and returns `None` when the bracket is plain text.
    fn parse_tag(&mut self) -> Result<Option<TagToken>, CompileError> {
        let start = self.position;
        let rest = &self.input[start + 1..];
        let (closing, body) = match rest.strip_prefix('/') {
            Some(body) => (true, body),
            None => (false, rest),
        };
        let digits = body.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Ok(None);
        }
        let after = &body[digits..];
        let (kind, terminator) = if after.starts_with('>') {
            (if closing { TagKind::Close } else { TagKind::Open }, 1)
        } else if !closing && after.starts_with("/>") {
            (TagKind::SelfClosing, 2)
        } else {
            return Ok(None);
        };
        let index = self.parse_index(&body[..digits], start)?;
        self.position = start + 1 + usize::from(closing) + digits + terminator;
        Ok(Some(TagToken { kind, index }))
    }

    /// Parses parts until the end of input or until the closing tag of `own_tag`.
    ///
    /// Every `<n>` recurses once, so the recursion depth follows the nesting depth of the
    /// input. A `</n>` is only accepted when `n` is the tag this call was opened for.
    fn parse_parts(&mut self, own_tag: Option<u32>) -> Result<Vec<Part>, CompileError> {
        let mut parts = Vec::new();
        let mut text = String::new();

        while let Some(c) = self.peek() {
            match c {
                '{' => {
                    if let Some(index) = self.parse_placeholder()? {
                        flush_text(&mut text, &mut parts);
                        parts.push(Part::Arg(index));
                        continue;
                    }
                }
                '<' => {
                    let offset = self.position;
                    if let Some(token) = self.parse_tag()? {
                        flush_text(&mut text, &mut parts);
                        match token.kind {
                            TagKind::Open => {
                                let children = self.parse_parts(Some(token.index))?;
                                parts.push(Part::Tag(Tag::new(token.index, children)));
                            }
                            TagKind::SelfClosing => {
                                parts.push(Part::Tag(Tag::new(token.index, Vec::new())));
                            }
                            TagKind::Close => {
                                if own_tag == Some(token.index) {
                                    return Ok(parts);
                                }
                                return Err(CompileError::MismatchedClose {
                                    tag: token.index,
                                    offset,
                                });
                            }
                        }
                        continue;
                    }
                }
                _ => {}
            }
            text.push(c);
            self.consume();
        }

        flush_text(&mut text, &mut parts);
        match own_tag {
            Some(tag) => Err(CompileError::Unclosed { tag }),
            None => Ok(parts),
        }
    }

    pub fn parse(&mut self) -> Result<CompiledElement, CompileError> {
        self.position = 0;
        let parts = self.parse_parts(None)?;
        Ok(CompiledElement::from_parts(parts))
    }
}

fn flush_text(text: &mut String, parts: &mut Vec<Part>) {
    if !text.is_empty() {
        parts.push(Part::Text(std::mem::take(text)));
    }
}

/// Compile a catalog string, reporting grammar errors to the caller
pub fn try_compile(text: &str) -> Result<CompiledElement, CompileError> {
    Parser::new(text).parse()
}

/// Compile a catalog string.
///
/// Catalog strings are edited by translators, so a malformed one is logged and replaced by
/// `fallback` instead of failing the build.
pub fn compile(text: &str, fallback: CompiledElement) -> CompiledElement {
    match try_compile(text) {
        Ok(element) => element,
        Err(e) => {
            tracing::warn!("Failed to compile '{}': {}", text, e);
            fallback
        }
    }
}

/// Write a compiled element back in the catalog string syntax
pub fn serialize(element: &CompiledElement) -> String {
    match element {
        CompiledElement::Text(text) => text.clone(),
        CompiledElement::Mixed(parts) | CompiledElement::Composite(parts) => {
            let mut out = String::new();
            write_parts(parts, &mut out);
            out
        }
    }
}

fn write_parts(parts: &[Part], out: &mut String) {
    for part in parts {
        match part {
            Part::Text(text) => out.push_str(text),
            Part::Arg(index) => out.push_str(&format!("{{{}}}", index)),
            Part::Tag(tag) if tag.children.is_empty() => {
                out.push_str(&format!("<{}/>", tag.index));
            }
            Part::Tag(tag) => {
                out.push_str(&format!("<{}>", tag.index));
                write_parts(&tag.children, out);
                out.push_str(&format!("</{}>", tag.index));
            }
        }
    }
}
