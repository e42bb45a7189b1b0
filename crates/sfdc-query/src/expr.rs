//! Time expressions for `env` bindings
//!
//! `env` values look like calls (`now()`, `now(timedelta(minutes=-60))`) but
//! are parsed into [`EnvExpr`] by a closed grammar and evaluated against the
//! run's clock. Nothing is ever executed.
//!
//! ```text
//! expr   := "now" "(" [ offset ] ")"
//! offset := "timedelta" "(" [ arg { "," arg } ] ")"
//! arg    := unit "=" int
//! unit   := "weeks" | "days" | "hours" | "minutes" | "seconds"
//! ```

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

/// Parsed `env` expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvExpr {
    /// Current time
    Now,
    /// Current time shifted by a signed offset
    NowOffset(Duration),
}

/// Expression does not match the grammar
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct ExprParseError {
    /// Byte offset of the problem
    pub offset: usize,
    /// What was expected
    pub message: String,
}

impl EnvExpr {
    /// Parse expression text
    ///
    /// # Errors
    /// `ExprParseError` if the text is outside the grammar, repeats a unit
    /// or overflows the offset
    pub fn parse(src: &str) -> Result<Self, ExprParseError> {
        let mut cursor = Cursor::new(src);
        cursor.keyword("now")?;
        cursor.expect('(')?;

        let expr = if cursor.peek() == Some(')') {
            Self::Now
        } else {
            cursor.keyword("timedelta")?;
            cursor.expect('(')?;
            let offset = parse_offset_args(&mut cursor)?;
            cursor.expect(')')?;
            Self::NowOffset(offset)
        };

        cursor.expect(')')?;
        cursor.skip_ws();
        if !cursor.at_end() {
            return Err(cursor.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    /// Evaluate against the run time
    ///
    /// Returns `None` when the offset leaves the representable range.
    #[inline]
    #[must_use]
    pub fn evaluate(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Now => Some(now),
            Self::NowOffset(offset) => now.checked_add_signed(*offset),
        }
    }

    /// Offset relative to now
    #[inline]
    #[must_use]
    pub fn offset(&self) -> Duration {
        match self {
            Self::Now => Duration::zero(),
            Self::NowOffset(offset) => *offset,
        }
    }
}

impl FromStr for EnvExpr {
    type Err = ExprParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EnvExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Now => f.write_str("now()"),
            Self::NowOffset(offset) if offset.num_seconds() % 60 == 0 => {
                write!(f, "now(timedelta(minutes={}))", offset.num_minutes())
            }
            Self::NowOffset(offset) => {
                write!(f, "now(timedelta(seconds={}))", offset.num_seconds())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Weeks,
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl Unit {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "weeks" => Some(Self::Weeks),
            "days" => Some(Self::Days),
            "hours" => Some(Self::Hours),
            "minutes" => Some(Self::Minutes),
            "seconds" => Some(Self::Seconds),
            _ => None,
        }
    }

    fn duration(self, n: i64) -> Option<Duration> {
        match self {
            Self::Weeks => Duration::try_weeks(n),
            Self::Days => Duration::try_days(n),
            Self::Hours => Duration::try_hours(n),
            Self::Minutes => Duration::try_minutes(n),
            Self::Seconds => Duration::try_seconds(n),
        }
    }
}

fn parse_offset_args(cursor: &mut Cursor<'_>) -> Result<Duration, ExprParseError> {
    let mut total = Duration::zero();
    let mut seen: Vec<Unit> = Vec::new();

    if cursor.peek() == Some(')') {
        return Ok(total);
    }

    loop {
        cursor.skip_ws();
        let unit_at = cursor.pos;
        let name = cursor.ident()?;
        let unit = Unit::from_name(name).ok_or_else(|| ExprParseError {
            offset: unit_at,
            message: format!("unknown timedelta unit '{name}'"),
        })?;
        if seen.contains(&unit) {
            return Err(ExprParseError {
                offset: unit_at,
                message: format!("duplicate timedelta unit '{name}'"),
            });
        }
        seen.push(unit);

        cursor.expect('=')?;
        let value_at = cursor.pos;
        let value = cursor.int()?;
        let overflow = || ExprParseError {
            offset: value_at,
            message: "timedelta out of range".to_string(),
        };
        let part = unit.duration(value).ok_or_else(overflow)?;
        total = total.checked_add(&part).ok_or_else(overflow)?;

        if cursor.peek() == Some(',') {
            cursor.bump();
            continue;
        }
        return Ok(total);
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.rest().chars().next() {
            self.pos += c.len_utf8();
        }
    }

    fn error(&self, message: impl Into<String>) -> ExprParseError {
        ExprParseError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn expect(&mut self, want: char) -> Result<(), ExprParseError> {
        match self.peek() {
            Some(c) if c == want => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{want}', found '{c}'"))),
            None => Err(self.error(format!("expected '{want}', found end of input"))),
        }
    }

    fn ident(&mut self) -> Result<&'a str, ExprParseError> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected identifier"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn keyword(&mut self, word: &str) -> Result<(), ExprParseError> {
        self.skip_ws();
        let at = self.pos;
        let found = self.ident()?;
        if found == word {
            Ok(())
        } else {
            Err(ExprParseError {
                offset: at,
                message: format!("expected '{word}', found '{found}'"),
            })
        }
    }

    fn int(&mut self) -> Result<i64, ExprParseError> {
        self.skip_ws();
        let rest = self.rest();
        let sign_len = usize::from(rest.starts_with(|c| c == '+' || c == '-'));
        let digits = rest[sign_len..]
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len() - sign_len);
        if digits == 0 {
            return Err(self.error("expected integer"));
        }
        let text = &rest[..sign_len + digits];
        let value = text
            .parse::<i64>()
            .map_err(|_| self.error(format!("integer out of range: {text}")))?;
        self.pos += sign_len + digits;
        Ok(value)
    }
}
