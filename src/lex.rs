use std::borrow::Cow;
use std::fmt::Display;

use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
#[error("empty expression")]
#[diagnostic(help("an equation needs at least one number"))]
pub struct EmptyExpressionError {
    #[source_code]
    src: NamedSource<String>,

    #[label("nothing to evaluate")]
    span: SourceSpan,
}

#[derive(Error, Debug, Diagnostic)]
#[error("unexpected character '{token}'")]
#[diagnostic(help(
    "equations may only contain digits, a `.` or `,` decimal separator, `+ - * /`, and parentheses"
))]
pub struct UnexpectedCharacterError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this character")]
    span: SourceSpan,

    pub token: char,
}

impl UnexpectedCharacterError {
    pub fn offset(&self) -> usize {
        self.span.offset()
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("operator '{token}' is missing an operand")]
#[diagnostic(help(
    "every operator needs a number or parenthesized group on both sides; only `+` and `-` may open an expression, as a sign"
))]
pub struct MisplacedOperatorError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this operator")]
    span: SourceSpan,

    pub token: char,
}

impl MisplacedOperatorError {
    pub fn offset(&self) -> usize {
        self.span.offset()
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("unbalanced parenthesis")]
#[diagnostic(help("every `(` needs a matching `)` and vice versa"))]
pub struct UnbalancedParenthesisError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this parenthesis has no match")]
    span: SourceSpan,
}

impl UnbalancedParenthesisError {
    pub fn offset(&self) -> usize {
        self.span.offset()
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("empty parentheses")]
#[diagnostic(help("parentheses must enclose an expression"))]
pub struct EmptyParenthesesError {
    #[source_code]
    src: NamedSource<String>,

    #[label("nothing inside")]
    span: SourceSpan,
}

#[derive(Error, Debug, Diagnostic)]
#[error("number has a second decimal point")]
#[diagnostic(help("a number may carry at most one `.` or `,`"))]
pub struct DuplicateDecimalError {
    #[source_code]
    src: NamedSource<String>,

    #[label("second separator")]
    span: SourceSpan,
}

impl DuplicateDecimalError {
    pub fn offset(&self) -> usize {
        self.span.offset()
    }
}

/// One of the four binary operators an equation may contain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Plus,
    Minus,
    Star,
    Slash,
}

impl Op {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'+' => Some(Op::Plus),
            b'-' => Some(Op::Minus),
            b'*' => Some(Op::Star),
            b'/' => Some(Op::Slash),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Op::Plus => '+',
            Op::Minus => '-',
            Op::Star => '*',
            Op::Slash => '/',
        }
    }

    /// Precedence class used to pick a split point: additive operators
    /// bind looser than multiplicative ones.
    pub fn precedence(self) -> u8 {
        match self {
            Op::Plus | Op::Minus => 1,
            Op::Star | Op::Slash => 2,
        }
    }

    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Op::Plus => lhs + rhs,
            Op::Minus => lhs - rhs,
            Op::Star => lhs * rhs,
            Op::Slash => lhs / rhs,
        }
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

fn is_operator(byte: u8) -> bool {
    Op::from_byte(byte).is_some()
}

/// Canonicalizes raw equation text: spaces dropped, `,` rewritten to `.`,
/// and any parenthesis pair enclosing the whole expression stripped, layer
/// by layer, until none qualifies.
///
/// Pure and total: empty or malformed input comes back unchanged rather
/// than failing here (rejection is the validator's job). Running the
/// result through `normalize` again is a no-op.
pub fn normalize(input: &str) -> Cow<'_, str> {
    match scrub(input) {
        Cow::Borrowed(scrubbed) => Cow::Borrowed(strip_enclosing(scrubbed)),
        Cow::Owned(scrubbed) => {
            let stripped = strip_enclosing(&scrubbed);
            if stripped.len() == scrubbed.len() {
                Cow::Owned(scrubbed)
            } else {
                Cow::Owned(stripped.to_string())
            }
        }
    }
}

/// Removes spaces and rewrites `,` decimal separators to `.`, borrowing
/// the input when it needs no rewrite.
fn scrub(input: &str) -> Cow<'_, str> {
    if input.bytes().any(|b| b == b' ' || b == b',') {
        Cow::Owned(
            input
                .chars()
                .filter(|&c| c != ' ')
                .map(|c| if c == ',' { '.' } else { c })
                .collect(),
        )
    } else {
        Cow::Borrowed(input)
    }
}

/// Like [`scrub`], but also maps each byte of the cleaned text back to the
/// byte offset of its source character, so a rejection found in the
/// cleaned text can be pointed out in the original.
fn scrub_indexed(input: &str) -> (String, Vec<usize>) {
    let mut cleaned = String::with_capacity(input.len());
    let mut origins = Vec::with_capacity(input.len());
    for (at, c) in input.char_indices() {
        if c == ' ' {
            continue;
        }
        let kept = if c == ',' { '.' } else { c };
        cleaned.push(kept);
        origins.extend(std::iter::repeat(at).take(kept.len_utf8()));
    }
    (cleaned, origins)
}

/// An outer pair encloses the string only when the depth first returns to
/// zero exactly at the last byte.
fn strip_enclosing(mut expr: &str) -> &str {
    while expr.starts_with('(') && expr.ends_with(')') {
        let bytes = expr.as_bytes();
        let mut depth = 0usize;
        let mut encloses = false;
        for (at, &byte) in bytes.iter().enumerate() {
            match byte {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        encloses = at == bytes.len() - 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        if !encloses {
            break;
        }
        expr = &expr[1..expr.len() - 1];
    }
    expr
}

/// Whether `text[start..end)` is a syntactically well-formed expression.
///
/// The range is half open and addresses the text after internal cleanup
/// (spaces removed, `,` rewritten), with `end` clamped to the cleaned
/// length. An empty range on the raw arguments is invalid.
pub fn is_valid_range(text: &str, start: usize, end: usize) -> bool {
    if end <= start {
        return false;
    }
    let cleaned = scrub(text);
    let end = end.min(cleaned.len());
    if start >= end {
        // The range vanished with the removed spaces; nothing left to reject.
        return true;
    }
    scan(cleaned.as_bytes(), start, end).is_ok()
}

/// Whole-string form of [`is_valid_range`].
pub fn is_valid(text: &str) -> bool {
    is_valid_range(text, 0, text.len())
}

/// Checks `text` for acceptance, reporting a rejection as a labeled
/// diagnostic pointing into the original (uncleaned) input.
///
/// This is the boundary a collaborator calls before storing an equation;
/// text rejected here never reaches the evaluator.
pub fn validate(text: &str) -> Result<(), Error> {
    let (cleaned, origins) = scrub_indexed(text);
    if cleaned.is_empty() {
        return Err(EmptyExpressionError {
            src: named(text),
            span: SourceSpan::from(0..text.len()),
        }
        .into());
    }
    let violation = match scan(cleaned.as_bytes(), 0, cleaned.len()) {
        Ok(()) => return Ok(()),
        Err(violation) => violation,
    };
    let span = original_span(text, &origins, violation.at);
    Err(match violation.kind {
        ViolationKind::UnexpectedCharacter => UnexpectedCharacterError {
            token: char_at(text, span.offset()),
            src: named(text),
            span,
        }
        .into(),
        ViolationKind::MisplacedOperator => MisplacedOperatorError {
            token: cleaned.as_bytes()[violation.at] as char,
            src: named(text),
            span,
        }
        .into(),
        ViolationKind::UnmatchedOpen | ViolationKind::UnmatchedClose => {
            UnbalancedParenthesisError { src: named(text), span }.into()
        }
        ViolationKind::EmptyGroup => EmptyParenthesesError { src: named(text), span }.into(),
        ViolationKind::SecondDecimal => DuplicateDecimalError { src: named(text), span }.into(),
    })
}

/// A rejection, located by byte offset into the cleaned text.
#[derive(Debug, Clone, Copy)]
struct Violation {
    kind: ViolationKind,
    at: usize,
}

#[derive(Debug, Clone, Copy)]
enum ViolationKind {
    UnexpectedCharacter,
    MisplacedOperator,
    UnmatchedOpen,
    UnmatchedClose,
    EmptyGroup,
    SecondDecimal,
}

/// Recursive validity scan over `bytes[start..end)`, already cleaned.
///
/// A parenthesized group must be non-empty and valid as a range of its
/// own (fresh `start`, so a leading sign is allowed right after the `(`);
/// the scan resumes at the byte after the group. Operators may not touch
/// each other or dangle at either end of a range, except that `+` and `-`
/// may open one as a sign. A number carries at most one decimal point;
/// the seen-point flag resets on operators and `(`.
fn scan(bytes: &[u8], start: usize, end: usize) -> Result<(), Violation> {
    let mut seen_dot = false;
    let mut i = start;
    while i < end {
        match bytes[i] {
            b'(' => {
                seen_dot = false;
                let Some(close) = matching_close(bytes, i, end) else {
                    return Err(Violation { kind: ViolationKind::UnmatchedOpen, at: i });
                };
                if close == i + 1 {
                    return Err(Violation { kind: ViolationKind::EmptyGroup, at: i });
                }
                scan(bytes, i + 1, close)?;
                i = close + 1;
                continue;
            }
            b')' => return Err(Violation { kind: ViolationKind::UnmatchedClose, at: i }),
            b'+' | b'-' | b'*' | b'/' => {
                seen_dot = false;
                if i == start {
                    if bytes[i] == b'*' || bytes[i] == b'/' {
                        return Err(Violation { kind: ViolationKind::MisplacedOperator, at: i });
                    }
                } else if is_operator(bytes[i - 1]) {
                    return Err(Violation { kind: ViolationKind::MisplacedOperator, at: i });
                }
                if i + 1 == end || is_operator(bytes[i + 1]) {
                    return Err(Violation { kind: ViolationKind::MisplacedOperator, at: i });
                }
            }
            b'0'..=b'9' => {}
            b'.' => {
                if seen_dot {
                    return Err(Violation { kind: ViolationKind::SecondDecimal, at: i });
                }
                seen_dot = true;
            }
            _ => return Err(Violation { kind: ViolationKind::UnexpectedCharacter, at: i }),
        }
        i += 1;
    }
    Ok(())
}

/// Index of the `)` matching the `(` at `open`, within `(open, end)`.
fn matching_close(bytes: &[u8], open: usize, end: usize) -> Option<usize> {
    let mut depth = 1usize;
    for at in open + 1..end {
        match bytes[at] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(at);
                }
            }
            _ => {}
        }
    }
    None
}

fn named(text: &str) -> NamedSource<String> {
    NamedSource::new("equation", text.to_string())
}

/// Span over the original input for the cleaned byte at `at`.
fn original_span(text: &str, origins: &[usize], at: usize) -> SourceSpan {
    let offset = origins.get(at).copied().unwrap_or(text.len());
    let len = text[offset..].chars().next().map_or(0, char::len_utf8);
    SourceSpan::from(offset..offset + len)
}

fn char_at(text: &str, offset: usize) -> char {
    text[offset..].chars().next().unwrap_or(' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_redundant_enclosing_pairs() {
        assert_eq!(normalize("((1+2))"), "1+2");
        assert_eq!(normalize("(1+2)"), "1+2");
        assert_eq!(normalize("(1+2)+(3)"), "(1+2)+(3)");
        assert_eq!(normalize("((1+2)+(3))"), "(1+2)+(3)");
        assert_eq!(normalize("(((7)))"), "7");
    }

    #[test]
    fn scrubs_spaces_and_decimal_commas() {
        assert_eq!(normalize("1 + 2,5"), "1+2.5");
        assert_eq!(normalize(" ( 1+2 ) "), "1+2");
        assert_eq!(normalize("1+2"), "1+2");
    }

    #[test]
    fn normalize_is_total_on_degenerate_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("(("), "((");
        assert_eq!(normalize("(()"), "(()");
        assert_eq!(normalize("()"), "");
        assert_eq!(normalize(")("), ")(");
        assert_eq!(normalize("("), "(");
    }

    #[test]
    fn normalize_reaches_a_fixed_point() {
        for raw in ["((1+2))", "(1+2)+(3)", " 5 , 5 ", "(((", "(1)(2)"] {
            let once = normalize(raw).into_owned();
            assert_eq!(normalize(&once), once, "{raw:?}");
        }
    }

    #[test]
    fn validity_over_ranges() {
        let cases: &[(&str, usize, usize, bool)] = &[
            ("1.2+3,4/5*6", 0, 11, true),
            ("a+b=c", 0, 5, false),
            ("1+2=3", 0, 5, false),
            ("(1+2)*3", 0, 7, true),
            ("(1+2*3", 0, 6, false),
            ("1+2)*3", 0, 6, false),
            ("1+)2*3(", 0, 7, false),
            ("1+(2+(3+4)+5)", 0, 13, true),
            ("1+2*3", 0, 5, true),
            ("1+*2", 0, 4, false),
            ("1+2*", 0, 4, false),
            ("-1+2*3", 0, 6, true),
            ("+1+*2", 0, 5, false),
            ("+1+(-1)", 0, 7, true),
            ("1.2.3", 0, 5, false),
            ("1..2", 0, 4, false),
            ("1 + 2 * 3", 0, 9, true),
            ("1       +2 -     3", 0, 15, true),
        ];
        for &(text, start, end, want) in cases {
            assert_eq!(is_valid_range(text, start, end), want, "{text:?} [{start}..{end})");
        }
    }

    #[test]
    fn rejects_empty_and_degenerate_ranges() {
        assert!(!is_valid(""));
        assert!(!is_valid_range("1+2", 2, 2));
        assert!(!is_valid_range("1+2", 3, 1));
        assert!(!is_valid("()"));
        assert!(!is_valid("3+()"));
    }

    #[test]
    fn examines_the_position_after_a_group() {
        assert!(!is_valid("(1+2)x"));
        assert!(is_valid("(1+2)*(3+4)"));
    }

    #[test]
    fn leading_sign_allowance_follows_range_starts() {
        assert!(is_valid("-1"));
        assert!(is_valid("(-1+2)*3"));
        assert!(!is_valid("*1"));
        assert!(!is_valid("(*1+2)"));
        assert!(!is_valid("1+-2"));
    }

    #[test]
    fn decimal_runs_reset_on_operators_and_open_parens() {
        assert!(is_valid("1.2+3.4"));
        assert!(is_valid("(1.5)*(2.5)"));
        assert!(is_valid("1+.5"));
        assert!(!is_valid("1.2.3"));
        assert!(!is_valid("1,5.2"));
    }

    #[test]
    fn diagnostics_point_into_the_uncleaned_input() {
        let err = validate("1 + 2 = 3").unwrap_err();
        let err = err
            .downcast_ref::<UnexpectedCharacterError>()
            .expect("unexpected character");
        assert_eq!(err.token, '=');
        assert_eq!(err.offset(), 6);
    }

    #[test]
    fn operator_misuse_is_reported_as_such() {
        let err = validate("1+*2").unwrap_err();
        let err = err.downcast_ref::<MisplacedOperatorError>().expect("misplaced operator");
        assert_eq!(err.token, '+');
        assert_eq!(err.offset(), 1);

        let err = validate("4 *").unwrap_err();
        let err = err.downcast_ref::<MisplacedOperatorError>().expect("trailing operator");
        assert_eq!(err.token, '*');
        assert_eq!(err.offset(), 2);

        assert!(
            validate("*4")
                .unwrap_err()
                .downcast_ref::<MisplacedOperatorError>()
                .is_some()
        );
    }

    #[test]
    fn paren_problems_have_their_own_diagnostics() {
        let err = validate("(1+2").unwrap_err();
        let err = err.downcast_ref::<UnbalancedParenthesisError>().expect("unmatched open");
        assert_eq!(err.offset(), 0);

        assert!(
            validate("1+2)")
                .unwrap_err()
                .downcast_ref::<UnbalancedParenthesisError>()
                .is_some()
        );
        assert!(
            validate("5+()")
                .unwrap_err()
                .downcast_ref::<EmptyParenthesesError>()
                .is_some()
        );
    }

    #[test]
    fn empty_input_is_rejected_at_the_boundary() {
        assert!(
            validate("")
                .unwrap_err()
                .downcast_ref::<EmptyExpressionError>()
                .is_some()
        );
        assert!(
            validate("   ")
                .unwrap_err()
                .downcast_ref::<EmptyExpressionError>()
                .is_some()
        );
    }

    #[test]
    fn second_decimal_point_is_its_own_diagnostic() {
        let err = validate("1 . . 2").unwrap_err();
        let err = err.downcast_ref::<DuplicateDecimalError>().expect("duplicate decimal");
        assert_eq!(err.offset(), 4);
        assert!(
            validate("1,5.2")
                .unwrap_err()
                .downcast_ref::<DuplicateDecimalError>()
                .is_some()
        );
    }

    #[test]
    fn operator_classes_and_symbols() {
        assert_eq!(Op::from_byte(b'+'), Some(Op::Plus));
        assert_eq!(Op::from_byte(b'^'), None);
        assert!(Op::Plus.precedence() < Op::Slash.precedence());
        assert_eq!(Op::Star.apply(3.0, 4.0), 12.0);
        assert_eq!(Op::Minus.to_string(), "-");
    }
}
