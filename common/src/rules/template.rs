//! Command templates attached to automation rules.
//!
//! A template is plain shell text with `{name}` placeholders. Only a fixed
//! set of names is accepted. Braces that hold no bare identifier are left
//! alone, and so is an unknown `{name}` inside shell quotes, where it
//! belongs to the quoted program (`awk '{print}'`).

use std::fmt;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Ip,
    Port,
    Protocol,
    OutputPath,
    Url,
    ScreenshotPath,
}

impl Placeholder {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ip" => Some(Self::Ip),
            "port" => Some(Self::Port),
            "protocol" => Some(Self::Protocol),
            "output_path" | "path" => Some(Self::OutputPath),
            "url" => Some(Self::Url),
            "screenshot_path" => Some(Self::ScreenshotPath),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(Placeholder),
}

/// Values substituted into a template for one firing.
#[derive(Debug, Clone, Default)]
pub struct TemplateValues<'a> {
    pub ip: &'a str,
    pub port: &'a str,
    pub protocol: &'a str,
    pub output_path: &'a str,
    pub url: &'a str,
    pub screenshot_path: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl CommandTemplate {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        if raw.trim().is_empty() {
            return Err(Error::config("command template is empty"));
        }

        let mut segments = Vec::new();
        let mut text = String::new();
        let mut quote: Option<char> = None;
        let mut rest = raw;

        while let Some(ch) = rest.chars().next() {
            if ch == '{' {
                let after = &rest[1..];
                let name = after
                    .find('}')
                    .map(|idx| &after[..idx])
                    .filter(|name| is_identifier(name));
                if let Some(name) = name {
                    match Placeholder::from_name(name) {
                        Some(slot) => {
                            if !text.is_empty() {
                                segments.push(Segment::Text(std::mem::take(&mut text)));
                            }
                            segments.push(Segment::Slot(slot));
                            rest = &after[name.len() + 1..];
                            continue;
                        }
                        None if quote.is_none() => {
                            return Err(Error::config(format!(
                                "unknown placeholder '{{{name}}}' in '{raw}'"
                            )));
                        }
                        None => {}
                    }
                }
            }

            let mut taken = ch.len_utf8();
            match (ch, quote) {
                ('\\', q) if q != Some('\'') => {
                    // a backslash escapes the next character
                    taken += rest[taken..].chars().next().map_or(0, char::len_utf8);
                }
                ('\'' | '"', None) => quote = Some(ch),
                (c, Some(q)) if c == q => quote = None,
                _ => {}
            }
            text.push_str(&rest[..taken]);
            rest = &rest[taken..];
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn uses(&self, placeholder: Placeholder) -> bool {
        self.segments
            .iter()
            .any(|segment| *segment == Segment::Slot(placeholder))
    }

    pub fn expand(&self, values: &TemplateValues<'_>) -> String {
        let mut out = String::with_capacity(self.raw.len() + 64);
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(Placeholder::Ip) => out.push_str(values.ip),
                Segment::Slot(Placeholder::Port) => out.push_str(values.port),
                Segment::Slot(Placeholder::Protocol) => out.push_str(values.protocol),
                Segment::Slot(Placeholder::OutputPath) => out.push_str(values.output_path),
                Segment::Slot(Placeholder::Url) => out.push_str(values.url),
                Segment::Slot(Placeholder::ScreenshotPath) => {
                    out.push_str(values.screenshot_path)
                }
            }
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_lowercase() || c == '_')
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
