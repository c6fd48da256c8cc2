//! Failure-condition expressions.
//!
//! Units can override the default success rule with a `failedWhen`
//! expression like `exitCode != 0 OR stderr contains panic`. The grammar is
//! deliberately small: comparisons and boolean connectives over exactly
//! three symbols - `exitCode`, `stdout`, `stderr` - taken from the unit's
//! operation result. Nothing here evaluates arbitrary code.

use std::fmt;

/// The three symbols an expression may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    ExitCode,
    Stdout,
    Stderr,
}

impl Symbol {
    fn parse(input: &str) -> Result<Self, String> {
        match input {
            "exitCode" => Ok(Self::ExitCode),
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            other => Err(format!(
                "unknown symbol '{other}' (expected exitCode, stdout, or stderr)"
            )),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitCode => write!(f, "exitCode"),
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Comparison operators supported in conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    GtEq,
    /// `<=`
    LtEq,
    /// `contains`
    Contains,
}

/// A literal on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Int(i64),
    Str(String),
}

impl Value {
    /// Quoted text is always a string; bare text that parses as an integer
    /// is numeric.
    fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        for quote in ['"', '\''] {
            if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
                return Self::Str(trimmed[1..trimmed.len() - 1].to_string());
            }
        }
        trimmed
            .parse::<i64>()
            .map_or_else(|_| Self::Str(trimmed.to_string()), Self::Int)
    }

    fn as_text(&self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            Self::Str(s) => s.clone(),
        }
    }
}

/// A single comparison: `symbol op value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    symbol: Symbol,
    op: Cmp,
    value: Value,
}

impl Condition {
    fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        if input.is_empty() {
            return Err("empty condition".into());
        }

        // Longest symbolic operators first so ">=" is not read as ">".
        let ops: &[(&str, Cmp)] = &[
            (">=", Cmp::GtEq),
            ("<=", Cmp::LtEq),
            ("!=", Cmp::NotEq),
            ("==", Cmp::Eq),
            (">", Cmp::Gt),
            ("<", Cmp::Lt),
        ];

        for (sym, op) in ops {
            if let Some(pos) = input.find(sym) {
                let symbol = Symbol::parse(input[..pos].trim())?;
                let value_str = input[pos + sym.len()..].trim();
                if value_str.is_empty() {
                    return Err(format!("missing value after '{sym}'"));
                }
                return Ok(Self {
                    symbol,
                    op: *op,
                    value: Value::parse(value_str),
                });
            }
        }

        if let Some(pos) = find_word(input, "contains") {
            let symbol = Symbol::parse(input[..pos].trim())?;
            let value_str = input[pos + "contains".len()..].trim();
            if value_str.is_empty() {
                return Err("missing value after 'contains'".into());
            }
            return Ok(Self {
                symbol,
                op: Cmp::Contains,
                value: Value::parse(value_str),
            });
        }

        Err(format!("no recognized operator in condition: '{input}'"))
    }

    fn eval(&self, exit_code: i32, stdout: &str, stderr: &str) -> bool {
        match self.symbol {
            Symbol::ExitCode => match &self.value {
                Value::Int(n) => cmp_ints(i64::from(exit_code), *n, self.op),
                Value::Str(s) => cmp_strs(&exit_code.to_string(), s, self.op),
            },
            Symbol::Stdout => cmp_strs(stdout, &self.value.as_text(), self.op),
            Symbol::Stderr => cmp_strs(stderr, &self.value.as_text(), self.op),
        }
    }
}

fn cmp_ints(left: i64, right: i64, op: Cmp) -> bool {
    match op {
        Cmp::Eq => left == right,
        Cmp::NotEq => left != right,
        Cmp::Gt => left > right,
        Cmp::Lt => left < right,
        Cmp::GtEq => left >= right,
        Cmp::LtEq => left <= right,
        Cmp::Contains => left.to_string().contains(&right.to_string()),
    }
}

fn cmp_strs(left: &str, right: &str, op: Cmp) -> bool {
    match op {
        Cmp::Eq => left == right,
        Cmp::NotEq => left != right,
        Cmp::Gt => left > right,
        Cmp::Lt => left < right,
        Cmp::GtEq => left >= right,
        Cmp::LtEq => left <= right,
        Cmp::Contains => left.contains(right),
    }
}

/// A parsed failure condition.
///
/// Connective keywords (`AND`, `OR`, `NOT`) are case-insensitive;
/// parentheses group as usual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Condition(Condition),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Parse an expression, e.g. `exitCode != 0 AND NOT (stdout contains ok)`.
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        if input.is_empty() {
            return Err("empty expression".into());
        }
        parse_or(input)
    }

    /// Evaluate against one operation result.
    pub fn eval(&self, exit_code: i32, stdout: &str, stderr: &str) -> bool {
        match self {
            Self::Condition(c) => c.eval(exit_code, stdout, stderr),
            Self::And(parts) => parts.iter().all(|e| e.eval(exit_code, stdout, stderr)),
            Self::Or(parts) => parts.iter().any(|e| e.eval(exit_code, stdout, stderr)),
            Self::Not(inner) => !inner.eval(exit_code, stdout, stderr),
        }
    }
}

fn parse_or(input: &str) -> Result<Expr, String> {
    let parts = split_top_level(input, "OR")?;
    if parts.len() == 1 {
        return parse_and(parts[0].trim());
    }
    let exprs: Result<Vec<Expr>, String> = parts.iter().map(|p| parse_and(p.trim())).collect();
    Ok(Expr::Or(exprs?))
}

fn parse_and(input: &str) -> Result<Expr, String> {
    let parts = split_top_level(input, "AND")?;
    if parts.len() == 1 {
        return parse_unary(parts[0].trim());
    }
    let exprs: Result<Vec<Expr>, String> = parts.iter().map(|p| parse_unary(p.trim())).collect();
    Ok(Expr::And(exprs?))
}

fn parse_unary(input: &str) -> Result<Expr, String> {
    let input = input.trim();

    if let Some(rest) = strip_not(input) {
        let inner = parse_unary(rest.trim_start())?;
        return Ok(Expr::Not(Box::new(inner)));
    }

    if input.starts_with('(') {
        let end = find_matching_paren(input)?;
        if end == input.len() - 1 {
            return parse_or(input[1..end].trim());
        }
        return Err(format!(
            "unexpected content after closing paren: '{}'",
            &input[end + 1..]
        ));
    }

    Ok(Expr::Condition(Condition::parse(input)?))
}

/// Strip a leading `NOT` (case-insensitive, followed by a space or an
/// opening paren). `get` keeps the prefix check safe on multibyte input.
fn strip_not(input: &str) -> Option<&str> {
    let prefix = input.get(..3)?;
    if !prefix.eq_ignore_ascii_case("NOT") {
        return None;
    }
    let rest = &input[3..];
    match rest.bytes().next() {
        Some(b' ' | b'(') => Some(rest),
        _ => None,
    }
}

/// Split on a top-level connective keyword, respecting parentheses and
/// quoted spans. The keyword match is case-insensitive and must be
/// space-delimited.
fn split_top_level<'a>(input: &'a str, keyword: &str) -> Result<Vec<&'a str>, String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut start = 0usize;
    let bytes = input.as_bytes();
    let kw_len = keyword.len();
    let input_len = input.len();
    let mut i = 0;

    while i < input_len {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
        } else if b == b'\'' || b == b'"' {
            quote = Some(b);
            i += 1;
        } else if b == b'(' {
            depth += 1;
            i += 1;
        } else if b == b')' {
            if depth == 0 {
                return Err("unmatched ')'".into());
            }
            depth -= 1;
            i += 1;
        } else if depth == 0
            && i > 0
            && bytes[i - 1] == b' '
            && input
                .get(i..i + kw_len)
                .is_some_and(|s| s.eq_ignore_ascii_case(keyword))
            && (i + kw_len == input_len || bytes[i + kw_len] == b' ')
        {
            parts.push(&input[start..i - 1]);
            start = i + kw_len;
            if start < input_len && bytes[start] == b' ' {
                start += 1;
            }
            i = start;
        } else {
            i += 1;
        }
    }

    if depth != 0 {
        return Err("unmatched '('".into());
    }

    parts.push(&input[start..]);
    Ok(parts)
}

fn find_matching_paren(input: &str) -> Result<usize, String> {
    debug_assert!(input.starts_with('('));
    let mut depth = 0;
    for (i, ch) in input.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err("unmatched '('".into())
}

/// Find `keyword` delimited by spaces (or string edges), case-insensitive.
fn find_word(input: &str, keyword: &str) -> Option<usize> {
    let lower = input.to_ascii_lowercase();
    let kw = keyword.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = lower[from..].find(&kw) {
        let abs = from + pos;
        let before_ok = abs == 0 || input.as_bytes()[abs - 1] == b' ';
        let end = abs + keyword.len();
        let after_ok = end >= input.len() || input.as_bytes()[end] == b' ';
        if before_ok && after_ok {
            return Some(abs);
        }
        from = abs + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str, exit_code: i32, stdout: &str, stderr: &str) -> bool {
        Expr::parse(expr).unwrap().eval(exit_code, stdout, stderr)
    }

    #[test]
    fn exit_code_comparisons() {
        assert!(eval("exitCode != 0", 2, "", ""));
        assert!(!eval("exitCode != 0", 0, "", ""));
        assert!(eval("exitCode == 1", 1, "", ""));
        assert!(eval("exitCode > 0", 3, "", ""));
        assert!(eval("exitCode >= 3", 3, "", ""));
        assert!(eval("exitCode <= 0", 0, "", ""));
        assert!(!eval("exitCode < 0", 0, "", ""));
    }

    #[test]
    fn stream_comparisons() {
        assert!(eval("stdout == done", 0, "done", ""));
        assert!(!eval("stdout == done", 0, "pending", ""));
        assert!(eval("stderr != ''", 0, "", "warn"));
        assert!(!eval("stderr != ''", 0, "", ""));
        assert!(eval("stdout contains error", 0, "fatal error: oops", ""));
        assert!(eval("stderr contains \"not found\"", 0, "", "file not found"));
    }

    #[test]
    fn quoted_values_keep_spaces() {
        assert!(eval("stdout == 'all good'", 0, "all good", ""));
        assert!(eval("stdout == \"all good\"", 0, "all good", ""));
    }

    #[test]
    fn connectives() {
        assert!(eval("exitCode != 0 AND stderr contains err", 1, "", "err!"));
        assert!(!eval("exitCode != 0 AND stderr contains err", 1, "", ""));
        assert!(eval("exitCode != 0 OR stderr contains err", 0, "", "err!"));
        assert!(eval("NOT exitCode == 0", 1, "", ""));
        assert!(eval("not exitCode == 0", 1, "", ""));
        assert!(eval(
            "(exitCode != 0 AND stdout == '') OR stderr contains panic",
            0,
            "fine",
            "thread panicked"
        ));
    }

    #[test]
    fn connectives_are_case_insensitive() {
        assert!(matches!(
            Expr::parse("exitCode == 0 and exitCode == 0").unwrap(),
            Expr::And(_)
        ));
        assert!(matches!(
            Expr::parse("exitCode == 0 Or exitCode == 1").unwrap(),
            Expr::Or(_)
        ));
    }

    #[test]
    fn rejects_unknown_symbols() {
        let err = Expr::parse("pid == 4").unwrap_err();
        assert!(err.contains("unknown symbol"));
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(Expr::parse("").is_err());
        assert!(Expr::parse("exitCode !=").is_err());
        assert!(Expr::parse("(exitCode == 0").is_err());
        assert!(Expr::parse("exitCode banana 0").is_err());
    }

    #[test]
    fn non_ascii_expressions_error_instead_of_panicking() {
        let err = Expr::parse("aa\u{e9} == 0").unwrap_err();
        assert!(err.contains("unknown symbol"));
        assert!(Expr::parse("\u{e9}\u{e9}").is_err());
        assert!(eval("stdout contains 'x \u{e9}\u{e9}a'", 0, "x \u{e9}\u{e9}a", ""));
    }

    #[test]
    fn quoted_values_may_contain_connective_keywords() {
        assert!(eval("stderr contains 'foo AND bar'", 0, "", "foo AND bar"));
        assert!(!eval("stderr contains \"a OR b\"", 0, "", "plain"));
        assert!(eval(
            "stdout == 'x' OR stderr contains 'y AND z'",
            0,
            "q",
            "y AND z"
        ));
    }

    #[test]
    fn exit_code_against_nonnumeric_value_compares_textually() {
        assert!(eval("exitCode == '2'", 2, "", ""));
        assert!(!eval("exitCode == two", 2, "", ""));
    }
}
