//! Conversion between document text and its paged (PDF) rendering.
//!
//! [`SinglePageRenderer`] writes the smallest PDF that shows the text on one
//! page and reads text back out of uncompressed content streams. It does not
//! decode compressed streams, fonts with custom encodings, or anything that
//! is not a text-showing operator.

use std::fmt::Write as _;

/// Converts text to a rendering and back.
pub trait Renderer {
    /// Render `text` to the paged format.
    fn render(&self, text: &str) -> Result<Vec<u8>, RenderError>;

    /// Extract the text shown by a paged document.
    fn extract_text(&self, bytes: &[u8]) -> Result<String, RenderError>;
}

/// Renderer producing an uncompressed single-page PDF.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinglePageRenderer;

impl SinglePageRenderer {
    const FONT_SIZE: u32 = 10;
    const ORIGIN: (u32, u32) = (20, 20);
}

impl Renderer for SinglePageRenderer {
    fn render(&self, text: &str) -> Result<Vec<u8>, RenderError> {
        let (x, y) = Self::ORIGIN;
        let mut content = format!("BT /F1 {} Tf {x} {y} Td (", Self::FONT_SIZE).into_bytes();
        escape_literal(text, &mut content);
        content.extend_from_slice(b") Tj ET");

        let objects: [Vec<u8>; 5] = [
            b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
            b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_vec(),
            b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
              /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>"
                .to_vec(),
            {
                let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
                stream.extend_from_slice(&content);
                stream.extend_from_slice(b"\nendstream");
                stream
            },
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold >>".to_vec(),
        ];

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (number, body) in (1..).zip(&objects) {
            offsets.push(out.len());
            out.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_offset = out.len();
        let mut trailer = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            let _ = writeln!(trailer, "{offset:010} 00000 n ");
        }
        let _ = write!(
            trailer,
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            objects.len() + 1
        );
        out.extend_from_slice(trailer.as_bytes());
        Ok(out)
    }

    fn extract_text(&self, bytes: &[u8]) -> Result<String, RenderError> {
        if !has_pdf_magic(bytes) {
            return Err(RenderError::NotPdf);
        }
        if contains(bytes, b"/FlateDecode") {
            return Err(RenderError::Unsupported(
                "compressed content streams".to_string(),
            ));
        }

        let mut shown = Vec::new();
        for stream in content_streams(bytes) {
            show_text(stream, &mut shown)?;
        }
        Ok(String::from_utf8_lossy(&shown).into_owned())
    }
}

/// Whether `bytes` starts with `%PDF`, ignoring a UTF-8 BOM and leading
/// whitespace.
fn has_pdf_magic(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    bytes.trim_ascii_start().starts_with(b"%PDF")
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}

/// The data of every `stream ... endstream` section, in file order.
fn content_streams(bytes: &[u8]) -> Vec<&[u8]> {
    let mut streams = Vec::new();
    let mut rest = bytes;
    while let Some(start) = find(rest, b"stream") {
        let mut data = &rest[start + b"stream".len()..];
        data = data
            .strip_prefix(b"\r\n")
            .or_else(|| data.strip_prefix(b"\n"))
            .unwrap_or(data);
        let Some(end) = find(data, b"endstream") else {
            break;
        };
        streams.push(&data[..end]);
        rest = &data[end + b"endstream".len()..];
    }
    streams
}

fn escape_literal(text: &str, out: &mut Vec<u8>) {
    for byte in text.bytes() {
        match byte {
            b'(' | b')' | b'\\' => out.extend_from_slice(&[b'\\', byte]),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(byte),
        }
    }
}

/// Token of a content stream, as far as text extraction cares.
enum Token {
    Text(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    Operator(Vec<u8>),
    Other,
}

/// Append the text shown by the operators of one content stream.
///
/// Strings are collected as operands and emitted when a show operator
/// (`Tj`, `TJ`, `'`, `"`) consumes them. Positioning operators between two
/// shows become a line break.
fn show_text(stream: &[u8], out: &mut Vec<u8>) -> Result<(), RenderError> {
    let mut operands: Vec<Vec<u8>> = Vec::new();
    let mut line_break = false;
    let mut tokens = Tokenizer { data: stream, pos: 0 };

    while let Some(token) = tokens.next_token()? {
        match token {
            Token::Text(text) => operands.push(text),
            Token::ArrayStart | Token::ArrayEnd | Token::Other => {}
            Token::Operator(op) => match op.as_slice() {
                b"Tj" | b"TJ" | b"'" | b"\"" => {
                    if op != b"Tj" && op != b"TJ" {
                        line_break = true;
                    }
                    if line_break && !out.is_empty() {
                        out.push(b'\n');
                    }
                    line_break = false;
                    for text in operands.drain(..) {
                        out.extend_from_slice(&text);
                    }
                }
                b"Td" | b"TD" | b"T*" | b"Tm" | b"ET" => {
                    line_break = true;
                    operands.clear();
                }
                _ => operands.clear(),
            },
        }
    }
    Ok(())
}

struct Tokenizer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Tokenizer<'_> {
    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn next_token(&mut self) -> Result<Option<Token>, RenderError> {
        while let Some(byte) = self.peek() {
            if byte.is_ascii_whitespace() {
                self.pos += 1;
            } else if byte == b'%' {
                while self.peek().is_some_and(|b| b != b'\n' && b != b'\r') {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
        let Some(byte) = self.peek() else {
            return Ok(None);
        };
        self.pos += 1;
        let token = match byte {
            b'(' => Token::Text(self.literal()?),
            b'<' if self.peek() == Some(b'<') => {
                self.pos += 1;
                Token::Other
            }
            b'<' => Token::Text(self.hex()?),
            b'>' => {
                if self.peek() == Some(b'>') {
                    self.pos += 1;
                }
                Token::Other
            }
            b'[' => Token::ArrayStart,
            b']' => Token::ArrayEnd,
            b'/' => {
                self.word();
                Token::Other
            }
            b'\'' | b'"' => Token::Operator(vec![byte]),
            b if b.is_ascii_alphabetic() || b == b'*' => {
                let start = self.pos - 1;
                self.word();
                Token::Operator(self.data[start..self.pos].to_vec())
            }
            _ => {
                self.word();
                Token::Other
            }
        };
        Ok(Some(token))
    }

    /// Skip the rest of a bare word (operator, name or number).
    fn word(&mut self) {
        while self
            .peek()
            .is_some_and(|b| !b.is_ascii_whitespace() && !b"()<>[]{}/%'\"".contains(&b))
        {
            self.pos += 1;
        }
    }

    /// Read a literal string after its opening parenthesis.
    fn literal(&mut self) -> Result<Vec<u8>, RenderError> {
        let mut text = Vec::new();
        let mut depth = 1usize;
        loop {
            let Some(byte) = self.peek() else {
                return Err(RenderError::Malformed("unterminated string".to_string()));
            };
            self.pos += 1;
            match byte {
                b'\\' => self.escape(&mut text),
                b'(' => {
                    depth += 1;
                    text.push(byte);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                    text.push(byte);
                }
                _ => text.push(byte),
            }
        }
    }

    fn escape(&mut self, text: &mut Vec<u8>) {
        let Some(byte) = self.peek() else {
            return;
        };
        self.pos += 1;
        match byte {
            b'n' => text.push(b'\n'),
            b'r' => text.push(b'\r'),
            b't' => text.push(b'\t'),
            b'b' => text.push(0x08),
            b'f' => text.push(0x0c),
            b'0'..=b'7' => {
                let mut value = u32::from(byte - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(digit @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(digit - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                text.push(u8::try_from(value & 0xff).unwrap_or(0));
            }
            // Line continuation.
            b'\n' => {}
            b'\r' => {
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            _ => text.push(byte),
        }
    }

    /// Read a hex string after its opening angle bracket.
    fn hex(&mut self) -> Result<Vec<u8>, RenderError> {
        let mut digits = Vec::new();
        loop {
            let Some(byte) = self.peek() else {
                return Err(RenderError::Malformed("unterminated hex string".to_string()));
            };
            self.pos += 1;
            match byte {
                b'>' => break,
                b if b.is_ascii_whitespace() => {}
                b if b.is_ascii_hexdigit() => digits.push(b),
                _ => {
                    return Err(RenderError::Malformed(format!(
                        "invalid hex digit {:?}",
                        char::from(byte)
                    )));
                }
            }
        }
        if digits.len() % 2 == 1 {
            digits.push(b'0');
        }
        Ok(digits
            .chunks(2)
            .map(|pair| (hex_value(pair[0]) << 4) | hex_value(pair[1]))
            .collect())
    }
}

const fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

/// Errors that can occur while rendering or reading a paged document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The input does not start with the `%PDF` magic.
    NotPdf,
    /// The input uses a feature this renderer cannot read.
    Unsupported(String),
    /// The input is structurally broken.
    Malformed(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotPdf => write!(f, "input is not a PDF"),
            Self::Unsupported(what) => write!(f, "unsupported PDF feature: {what}"),
            Self::Malformed(msg) => write!(f, "malformed PDF: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {}
