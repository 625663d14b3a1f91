// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Part21 string escapes
//!
//! | Escape                  | Meaning                                        |
//! |-------------------------|------------------------------------------------|
//! | `''`                    | apostrophe                                     |
//! | `\\`                    | backslash                                      |
//! | `\PA\` … `\PI\`         | switch to ISO-8859-1 … ISO-8859-9              |
//! | `\S\c`                  | byte `c + 0x80` in the active code page        |
//! | `\X\hh`                 | byte `hh` in the active code page              |
//! | `\X2\hhhh…\X0\`         | UTF-16 code units                              |
//! | `\X4\hhhhhhhh…\X0\`     | Unicode scalar values                          |
//!
//! Decoding runs on isolated string literals, so malformed escapes are hard
//! errors rather than diagnostics.

use std::fmt::Write;

use nom::bytes::complete::{tag, take_while_m_n};
use nom::IResult;

use crate::codepage::CodePage;
use crate::error::DecodeError;

/// Decode the body of a string literal (without the quotes).
pub fn decode(input: &str) -> Result<String, DecodeError> {
    decode_with_codepage(input, CodePage::default())
}

/// Decode starting from a specific code page.
pub fn decode_with_codepage(input: &str, mut page: CodePage) -> Result<String, DecodeError> {
    let mut decoded = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(c) = rest.chars().next() {
        rest = &rest[c.len_utf8()..];
        match c {
            '\'' => {
                rest = rest.strip_prefix('\'').unwrap_or(rest);
                decoded.push('\'');
            }
            '\\' => rest = decode_escape(rest, &mut page, &mut decoded)?,
            _ => decoded.push(c),
        }
    }
    Ok(decoded)
}

/// Decode one escape; `input` starts right after the backslash.
fn decode_escape<'i>(
    input: &'i str,
    page: &mut CodePage,
    decoded: &mut String,
) -> Result<&'i str, DecodeError> {
    let mut chars = input.chars();
    let verbatim = |decoded: &mut String| {
        decoded.push('\\');
        Ok(input)
    };

    match chars.next().ok_or(DecodeError::UnexpectedEof)? {
        '\\' => {
            decoded.push('\\');
            Ok(chars.as_str())
        }
        'P' => {
            let letter = chars.next().ok_or(DecodeError::UnexpectedEof)?;
            *page = CodePage::from_letter(letter).ok_or(DecodeError::InvalidCodePage(letter))?;
            match chars.next().ok_or(DecodeError::UnexpectedEof)? {
                '\\' => Ok(chars.as_str()),
                other => Err(DecodeError::InvalidCodePageTerminator(other)),
            }
        }
        'S' => match chars.next().ok_or(DecodeError::UnexpectedEof)? {
            '\\' => {
                let payload = chars.next().ok_or(DecodeError::UnexpectedEof)?;
                let byte = u8::try_from(u32::from(payload))
                    .ok()
                    .filter(|b| *b < 0x80)
                    .ok_or(DecodeError::InvalidUpperAscii(payload))?;
                decoded.push(page.decode(byte + 0x80));
                Ok(chars.as_str())
            }
            _ => verbatim(decoded),
        },
        'X' => match chars.next().ok_or(DecodeError::UnexpectedEof)? {
            '\\' => {
                let (rest, byte) = hex_value(chars.as_str(), 2)?;
                decoded.push(page.decode(byte as u8));
                Ok(rest)
            }
            width @ ('2' | '4') => {
                let rest = chars.as_str();
                let rest = rest.strip_prefix('\\').ok_or_else(|| match rest.chars().next() {
                    Some(c) => DecodeError::InvalidHex(c.to_string()),
                    None => DecodeError::UnexpectedEof,
                })?;
                if width == '2' {
                    decode_utf16_run(rest, decoded)
                } else {
                    decode_utf32_run(rest, decoded)
                }
            }
            _ => verbatim(decoded),
        },
        _ => verbatim(decoded),
    }
}

/// Parse exactly `width` hex digits.
fn hex_value(input: &str, width: usize) -> Result<(&str, u32), DecodeError> {
    let parsed: IResult<&str, &str> =
        take_while_m_n(width, width, |c: char| c.is_ascii_hexdigit())(input);
    match parsed {
        Ok((rest, digits)) => u32::from_str_radix(digits, 16)
            .map(|value| (rest, value))
            .map_err(|_| DecodeError::InvalidHex(digits.to_string())),
        Err(_) => {
            let prefix: String = input.chars().take(width).collect();
            if prefix.len() < width && prefix.chars().all(|c| c.is_ascii_hexdigit()) {
                Err(DecodeError::UnexpectedEof)
            } else {
                Err(DecodeError::InvalidHex(prefix))
            }
        }
    }
}

/// Strip the `\X0\` that closes a multi-byte run.
fn run_end(input: &str) -> Option<&str> {
    let closed: IResult<&str, &str> = tag(r"\X0\")(input);
    closed.ok().map(|(rest, _)| rest)
}

fn decode_utf16_run<'i>(mut input: &'i str, decoded: &mut String) -> Result<&'i str, DecodeError> {
    let mut units = Vec::new();
    let rest = loop {
        if let Some(rest) = run_end(input) {
            break rest;
        }
        if input.is_empty() {
            return Err(DecodeError::UnexpectedEof);
        }
        let (rest, unit) = hex_value(input, 4)?;
        units.push(unit as u16);
        input = rest;
    };
    for c in char::decode_utf16(units) {
        let c = c.map_err(|err| DecodeError::InvalidCodePoint(u32::from(err.unpaired_surrogate())))?;
        decoded.push(c);
    }
    Ok(rest)
}

fn decode_utf32_run<'i>(mut input: &'i str, decoded: &mut String) -> Result<&'i str, DecodeError> {
    loop {
        if let Some(rest) = run_end(input) {
            return Ok(rest);
        }
        if input.is_empty() {
            return Err(DecodeError::UnexpectedEof);
        }
        let (rest, code) = hex_value(input, 8)?;
        decoded.push(char::from_u32(code).ok_or(DecodeError::InvalidCodePoint(code))?);
        input = rest;
    }
}

/// Active multi-byte run of the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    TwoByte,
    FourByte,
}

fn switch_mode(encoded: &mut String, mode: &mut Mode, next: Mode) {
    if *mode == next {
        return;
    }
    if *mode != Mode::Normal {
        encoded.push_str(r"\X0\");
    }
    match next {
        Mode::TwoByte => encoded.push_str(r"\X2\"),
        Mode::FourByte => encoded.push_str(r"\X4\"),
        Mode::Normal => {}
    }
    *mode = next;
}

/// Encode text as the body of a Part21 string literal.
pub fn encode(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len() + 8);
    let mut mode = Mode::Normal;

    for c in text.chars() {
        let code = u32::from(c);
        if code > 0xFFFF {
            switch_mode(&mut encoded, &mut mode, Mode::FourByte);
            let _ = write!(encoded, "{code:08X}");
        } else if code > 0xFF {
            switch_mode(&mut encoded, &mut mode, Mode::TwoByte);
            let _ = write!(encoded, "{code:04X}");
        } else {
            switch_mode(&mut encoded, &mut mode, Mode::Normal);
            match c {
                '\'' => encoded.push_str("''"),
                '\\' => encoded.push_str(r"\\"),
                _ if !(32..=126).contains(&code) => {
                    let _ = write!(encoded, r"\X\{code:02X}");
                }
                _ => encoded.push(c),
            }
        }
    }
    switch_mode(&mut encoded, &mut mode, Mode::Normal);
    encoded
}
