//! Smart coordinates.
//!
//! A coordinate is resolved against a reference length (the image width or
//! height) and, where it makes sense, the size of the element being placed.
//! Everything here is pure and testable without any image.
//!
//! | Expression | Meaning |
//! |---|---|
//! | `10` | 10 px from the near edge |
//! | `-10` | 10 px from the far edge (`reference - 10`) |
//! | `30%` | `round(0.30 * reference)` |
//! | `-30%` | `reference - round(0.30 * reference)` |
//! | `c`, `center`, `middle` | `floor((reference - element) / 2)` |
//! | `left`, `top` | `0` |
//! | `right`, `bottom` | `reference - element` |
//! | `c+10`, `50%-20`, `-10-5%` | position followed by offsets, left to right |
//!
//! Offsets after the first term never anchor from the far edge: `-10-5`
//! means "10 px from the far edge, then 5 px further in".

use crate::error::{Error, Result};

/// A position or size expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Coordinate {
    /// Absolute pixels; negative values anchor from the far edge.
    Pixels(i64),
    /// Percentage of the reference length; negative values anchor from the far edge.
    Percent(f64),
    /// Textual expression, parsed when resolved.
    Expr(String),
}

impl Coordinate {
    /// Resolve against `reference` with a zero-sized element.
    pub fn resolve(&self, reference: u32) -> Result<i64> {
        self.resolve_within(reference, 0)
    }

    /// Resolve against `reference` for an element of `element` pixels.
    pub fn resolve_within(&self, reference: u32, element: u32) -> Result<i64> {
        match self {
            Coordinate::Pixels(v) => Ok(position(
                v.is_negative(),
                v.unsigned_abs() as f64,
                false,
                reference,
            )),
            Coordinate::Percent(p) => Ok(position(p.is_sign_negative(), p.abs(), true, reference)),
            Coordinate::Expr(s) => resolve_within(s, reference, element),
        }
    }
}

impl Default for Coordinate {
    fn default() -> Self {
        Coordinate::Pixels(0)
    }
}

impl From<i64> for Coordinate {
    fn from(v: i64) -> Self {
        Coordinate::Pixels(v)
    }
}

impl From<i32> for Coordinate {
    fn from(v: i32) -> Self {
        Coordinate::Pixels(v.into())
    }
}

impl From<u32> for Coordinate {
    fn from(v: u32) -> Self {
        Coordinate::Pixels(v.into())
    }
}

impl From<&str> for Coordinate {
    fn from(s: &str) -> Self {
        Coordinate::Expr(s.to_string())
    }
}

impl From<String> for Coordinate {
    fn from(s: String) -> Self {
        Coordinate::Expr(s)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Coordinate::Pixels(v) => write!(f, "{v}"),
            Coordinate::Percent(p) => write!(f, "{p}%"),
            Coordinate::Expr(s) => f.write_str(s),
        }
    }
}

/// Resolve a textual expression with a zero-sized element.
pub fn resolve(expr: &str, reference: u32) -> Result<i64> {
    resolve_within(expr, reference, 0)
}

/// Resolve a textual expression for an element of `element` pixels.
pub fn resolve_within(expr: &str, reference: u32, element: u32) -> Result<i64> {
    let parsed = parse(expr).ok_or_else(|| Error::InvalidCoordinate(expr.to_string()))?;

    let mut value = match parsed.anchor {
        Anchor::Start => 0,
        Anchor::End => reference as i64 - element as i64,
        Anchor::Center => (reference as i64 - element as i64).div_euclid(2),
        Anchor::Value {
            negative,
            magnitude,
            percent,
        } => position(negative, magnitude, percent, reference),
    };

    for offset in parsed.offsets {
        let amount = scale(offset.magnitude, offset.percent, reference);
        value = if offset.negative {
            value.saturating_sub(amount)
        } else {
            value.saturating_add(amount)
        };
    }

    Ok(value)
}

fn scale(magnitude: f64, percent: bool, reference: u32) -> i64 {
    if percent {
        (magnitude / 100.0 * reference as f64).round() as i64
    } else {
        magnitude.round() as i64
    }
}

fn position(negative: bool, magnitude: f64, percent: bool, reference: u32) -> i64 {
    let amount = scale(magnitude, percent, reference);
    if negative {
        (reference as i64).saturating_sub(amount)
    } else {
        amount
    }
}

#[derive(Debug, PartialEq)]
enum Anchor {
    Start,
    Center,
    End,
    Value {
        negative: bool,
        magnitude: f64,
        percent: bool,
    },
}

#[derive(Debug, PartialEq)]
struct Offset {
    negative: bool,
    magnitude: f64,
    percent: bool,
}

#[derive(Debug, PartialEq)]
struct Parsed {
    anchor: Anchor,
    offsets: Vec<Offset>,
}

fn parse(expr: &str) -> Option<Parsed> {
    let text: String = expr
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    let mut cursor = Cursor {
        bytes: text.as_bytes(),
        pos: 0,
    };

    let anchor = if cursor.peek()?.is_ascii_alphabetic() {
        match cursor.word() {
            "c" | "center" | "middle" => Anchor::Center,
            "left" | "top" => Anchor::Start,
            "right" | "bottom" => Anchor::End,
            _ => return None,
        }
    } else {
        let negative = match cursor.peek()? {
            b'-' => {
                cursor.pos += 1;
                true
            }
            b'+' => {
                cursor.pos += 1;
                false
            }
            _ => false,
        };
        let (magnitude, percent) = cursor.number()?;
        Anchor::Value {
            negative,
            magnitude,
            percent,
        }
    };

    let mut offsets = Vec::new();
    while let Some(op) = cursor.peek() {
        let negative = match op {
            b'+' => false,
            b'-' => true,
            _ => return None,
        };
        cursor.pos += 1;
        let (magnitude, percent) = cursor.number()?;
        offsets.push(Offset {
            negative,
            magnitude,
            percent,
        });
    }

    Some(Parsed { anchor, offsets })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn word(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("")
    }

    /// `digits ['.' digits] ['%']`
    fn number(&mut self) -> Option<(f64, bool)> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            let frac = self.pos;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
            if self.pos == frac {
                return None;
            }
        }
        let value: f64 = std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()?
            .parse()
            .ok()?;
        let percent = self.peek() == Some(b'%');
        if percent {
            self.pos += 1;
        }
        Some((value, percent))
    }
}
