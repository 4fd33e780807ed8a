//! Minimal tag scanner for the XML and HTML feeds.
//!
//! Only what the bundled decoders need: start/end tags with their attribute
//! text, and trimmed text runs. Comments, declarations and processing
//! instructions are skipped, as is the body of `script` and `style`
//! elements. Text is returned raw; [`unescape`] decodes the common entities.
//! `>` inside attribute values is not supported.

use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Open {
        name: &'a str,
        attrs: &'a str,
        self_closing: bool,
    },
    Close(&'a str),
    Text(&'a str),
}

pub struct Tokens<'a> {
    rest: &'a str,
    /// Set after opening an element whose body is not markup.
    raw_text: Option<&'a str>,
}

pub fn tokens(input: &str) -> Tokens<'_> {
    Tokens {
        rest: input,
        raw_text: None,
    }
}

fn is_raw_text(name: &str) -> bool {
    name.eq_ignore_ascii_case("script") || name.eq_ignore_ascii_case("style")
}

/// Offset of the `</name` that ends a raw text element, ignoring case.
fn find_close(rest: &str, name: &str) -> Option<usize> {
    rest.match_indices("</").map(|(at, _)| at).find(|&at| {
        rest.get(at + 2..at + 2 + name.len())
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name))
    })
}

/// Drops a namespace prefix (`gesmes:Envelope` -> `Envelope`).
fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if let Some(name) = self.raw_text.take() {
            let rest = self.rest;
            self.rest = find_close(rest, name).map_or("", |at| &rest[at..]);
        }

        loop {
            if self.rest.is_empty() {
                return None;
            }

            if let Some(comment) = self.rest.strip_prefix("<!--") {
                self.rest = comment.find("-->").map_or("", |end| &comment[end + 3..]);
                continue;
            }

            if self.rest.starts_with('<') {
                let Some(end) = self.rest.find('>') else {
                    self.rest = "";
                    return None;
                };
                let tag = &self.rest[1..end];
                self.rest = &self.rest[end + 1..];

                if tag.starts_with('?') || tag.starts_with('!') {
                    continue;
                }
                if let Some(name) = tag.strip_prefix('/') {
                    return Some(Token::Close(local_name(name.trim())));
                }

                let (tag, self_closing) = match tag.strip_suffix('/') {
                    Some(tag) => (tag, true),
                    None => (tag, false),
                };
                let tag = tag.trim();
                let (name, attrs) = tag
                    .split_once(char::is_whitespace)
                    .unwrap_or((tag, ""));
                if !self_closing && is_raw_text(name) {
                    self.raw_text = Some(name);
                }
                return Some(Token::Open {
                    name: local_name(name),
                    attrs,
                    self_closing,
                });
            }

            let end = self.rest.find('<').unwrap_or(self.rest.len());
            let text = self.rest[..end].trim();
            self.rest = &self.rest[end..];
            if !text.is_empty() {
                return Some(Token::Text(text));
            }
        }
    }
}

/// Value of attribute `key` in a tag's attribute text. Values must be quoted.
pub fn attr<'a>(attrs: &'a str, key: &str) -> Option<&'a str> {
    let mut rest = attrs;
    while let Some(eq) = rest.find('=') {
        let name = rest[..eq].trim_end().rsplit(char::is_whitespace).next()?;
        let after = rest[eq + 1..].trim_start();
        let quote = after.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let len = after[1..].find(quote)?;
        if name == key {
            return Some(&after[1..1 + len]);
        }
        rest = &after[len + 2..];
    }
    None
}

/// Decodes the named entities HTML tables commonly carry and numeric
/// character references. Non-breaking spaces become plain spaces; unknown
/// entities are left as written.
pub fn unescape(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .and_then(|end| entity(&rest[1..end]).map(|ch| (ch, end)));
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)?
        }
    };
    Some(if ch == '\u{a0}' { ' ' } else { ch })
}
