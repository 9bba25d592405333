//! Depth tracking for embedded component blocks such as `<Tabs>...</Tabs>`.
//!
//! The scanner walks each line once, byte by byte. Only tags whose name is
//! exactly the opening tag's name move the depth; quoted attribute values and
//! `{...}` expressions inside an open tag are skipped so a `>` inside them does
//! not end the tag early.

/// Name of a capitalized custom element opening the (trimmed) line.
pub(crate) fn opening_tag(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('<')?;
    if !rest.starts_with(|ch: char| ch.is_ascii_uppercase()) {
        return None;
    }
    let name = &rest[..tag_name_len(rest.as_bytes())];
    Some(name)
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'.' | b'-')
}

fn tag_name_len(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|byte| is_name_byte(**byte)).count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    OpenTag {
        quote: Option<u8>,
        braces: usize,
        last_significant: u8,
    },
}

#[derive(Debug)]
pub(crate) struct TagDepthScanner<'a> {
    tag: &'a str,
    depth: usize,
    opened: bool,
    state: State,
}

impl<'a> TagDepthScanner<'a> {
    pub(crate) fn new(tag: &'a str) -> Self {
        Self {
            tag,
            depth: 0,
            opened: false,
            state: State::Text,
        }
    }

    /// Feeds one line; returns true once the outermost tag has closed.
    pub(crate) fn feed(&mut self, line: &str) -> bool {
        let bytes = line.as_bytes();
        let mut idx = 0;
        while idx < bytes.len() {
            let byte = bytes[idx];
            match self.state {
                State::Text => {
                    if byte != b'<' {
                        idx += 1;
                        continue;
                    }
                    let after = &bytes[idx + 1..];
                    if let Some(name) = after.strip_prefix(b"/") {
                        let len = tag_name_len(name);
                        if &name[..len] == self.tag.as_bytes() {
                            self.depth = self.depth.saturating_sub(1);
                            if self.opened && self.depth == 0 {
                                return true;
                            }
                        }
                        idx += 2 + len;
                        continue;
                    }
                    let len = tag_name_len(after);
                    if len > 0 && &after[..len] == self.tag.as_bytes() {
                        self.depth += 1;
                        self.opened = true;
                        self.state = State::OpenTag {
                            quote: None,
                            braces: 0,
                            last_significant: b'<',
                        };
                    }
                    idx += 1 + len;
                }
                State::OpenTag {
                    quote,
                    braces,
                    last_significant,
                } => {
                    idx += 1;
                    if let Some(open) = quote {
                        if byte == open {
                            self.state = State::OpenTag {
                                quote: None,
                                braces,
                                last_significant: byte,
                            };
                        }
                        continue;
                    }
                    match byte {
                        b'"' | b'\'' | b'`' => {
                            self.state = State::OpenTag {
                                quote: Some(byte),
                                braces,
                                last_significant: byte,
                            };
                        }
                        b'{' => {
                            self.state = State::OpenTag {
                                quote: None,
                                braces: braces + 1,
                                last_significant: byte,
                            };
                        }
                        b'}' => {
                            self.state = State::OpenTag {
                                quote: None,
                                braces: braces.saturating_sub(1),
                                last_significant: byte,
                            };
                        }
                        b'>' if braces == 0 => {
                            self.state = State::Text;
                            if last_significant == b'/' {
                                self.depth = self.depth.saturating_sub(1);
                                if self.depth == 0 {
                                    return true;
                                }
                            }
                        }
                        byte if byte.is_ascii_whitespace() => {}
                        byte => {
                            self.state = State::OpenTag {
                                quote: None,
                                braces,
                                last_significant: byte,
                            };
                        }
                    }
                }
            }
        }
        false
    }
}
