//! Control directives embedded in script comments.
//!
//! A script line is either literal keystrokes or a directive. Directives live
//! in comment lines (`# passthrough`, `# delay 12`) and are never typed into
//! the shell.
//!
//! The top-level entry points are [`classify_line`] and [`Directive::parse`].

use crate::pacing::DEFAULT_DELAY_TENTHS;

/// Classification of a single script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    /// Literal keystrokes, terminators included.
    Plain(&'a str),
    /// Directive text with leading spaces and `#` characters stripped.
    Directive(&'a str),
}

/// A parsed control directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Relay the operator's keystrokes to the shell until Ctrl-C.
    Passthrough,
    /// Pause playback for the given number of tenths of a second.
    Delay(u64),
    /// Recognized as a directive but has no effect.
    Unknown(String),
}

/// Classify a script line as [`Line::Plain`] or [`Line::Directive`].
///
/// Any line containing a `#` is a directive candidate. It is kept as an
/// ordinary line only when the run of leading `#` characters is exactly one
/// longer than the offset of the first space.
///
/// # Example
///
/// ```
/// use ttyrun::directive::{classify_line, Line};
///
/// assert_eq!(classify_line("ls -l\n"), Line::Plain("ls -l\n"));
/// assert_eq!(classify_line("# delay 12\n"), Line::Directive("delay 12\n"));
/// ```
pub fn classify_line(line: &str) -> Line<'_> {
    if !line.contains('#') {
        return Line::Plain(line);
    }

    let leading_hashes = line.bytes().take_while(|&b| b == b'#').count();
    let first_space = line.find(' ').unwrap_or(line.len());
    if is_ordinary_comment(leading_hashes, first_space) {
        return Line::Plain(line);
    }

    Line::Directive(line.trim_start_matches([' ', '#']))
}

// Kept literally even though a leading run of `#` can never end before the
// first space; lines containing `#` therefore always classify as directives.
fn is_ordinary_comment(leading_hashes: usize, first_space: usize) -> bool {
    leading_hashes == first_space + 1
}

type ParseFn = fn(&str) -> Directive;

static REGISTRY: &[(&str, ParseFn)] = &[("pass", parse_passthrough), ("delay", parse_delay)];

impl Directive {
    /// Dispatch directive text to the first keyword it contains.
    ///
    /// Keywords are matched as substrings in registry order, so `pass` wins
    /// over `delay` when both appear.
    ///
    /// ```
    /// use ttyrun::Directive;
    ///
    /// assert_eq!(Directive::parse("passthrough\n"), Directive::Passthrough);
    /// assert_eq!(Directive::parse("delay 12\n"), Directive::Delay(12));
    /// assert_eq!(Directive::parse("delay\n"), Directive::Delay(5));
    /// ```
    pub fn parse(text: &str) -> Directive {
        REGISTRY
            .iter()
            .find(|(keyword, _)| text.contains(keyword))
            .map(|(_, parse)| parse(text))
            .unwrap_or_else(|| Directive::Unknown(text.trim_end().to_string()))
    }
}

fn parse_passthrough(_text: &str) -> Directive {
    Directive::Passthrough
}

/// `delay N` where `N` is tenths of a second; a missing or malformed count
/// falls back to the default.
fn parse_delay(text: &str) -> Directive {
    let tenths = text
        .split_once("delay")
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .and_then(|token| token.parse().ok())
        .unwrap_or(DEFAULT_DELAY_TENTHS);
    Directive::Delay(tenths)
}
