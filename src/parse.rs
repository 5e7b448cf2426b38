use crate::lex::{Op, normalize};

/// Finds the operator applied last when evaluating `expr`: the rightmost
/// operator of the loosest precedence class outside any parentheses.
///
/// The expression is normalized first and the returned index addresses
/// that normalized form (normalization is idempotent, so callers holding
/// already-normalized text can index into it directly). `None` means the
/// expression is a bare number, possibly with a leading sign.
pub fn split_point(expr: &str) -> Option<(usize, Op)> {
    let expr = normalize(expr);
    let bytes = expr.as_bytes();
    let mut best: Option<(usize, Op)> = None;
    // Until a real candidate shows up the running class is the tightest
    // one; `<=` below then makes the first operator win and later
    // operators of the same class override earlier ones.
    let mut class = 2u8;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'(' {
            // A parenthesized group is never a split candidate; jump to
            // its matching close and move on.
            let mut depth = 1i32;
            for j in i + 1..bytes.len() {
                match bytes[j] {
                    b'(' => depth += 1,
                    b')' => depth -= 1,
                    _ => {}
                }
                if depth == 0 {
                    i = j;
                    break;
                }
            }
        } else if i != 0 {
            // Index 0 is never an operator position; a sign lives there.
            if let Some(op) = Op::from_byte(bytes[i]) {
                if op.precedence() <= class {
                    best = Some((i, op));
                    class = op.precedence();
                }
            }
        }
        i += 1;
    }
    best
}
