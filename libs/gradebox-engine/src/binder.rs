/// Argument Binder - Test Input to Call Arguments
///
/// **Core Responsibility:**
/// Turn a test case's ordered `input` mapping into the positional argument
/// list the submitted function is called with.
///
/// **Binding Policy:**
/// Structured values pass through unchanged. Textual values are first offered
/// to a restricted literal parser (numbers, quoted strings, lists, tuples,
/// dicts, True/False/None) because upstream fixture generators emit inputs
/// either as structured JSON or as quoted literal text. If the text is not a
/// constant literal it is passed through verbatim - intentional strings must
/// never be mangled by a wrong type guess.
///
/// The parser accepts constant literals only. It never evaluates names,
/// calls, or operators, so no expression in a test fixture can run code.
use gradebox_common::types::InputMap;
use serde_json::Value;

/// Bind a test case's input mapping to an ordered argument list.
///
/// Order is the mapping's own insertion order; an empty mapping yields an
/// empty list (the entry point must then be nullary). Pure function.
pub fn bind_args(input: &InputMap) -> Vec<Value> {
    input
        .values()
        .map(|value| match value {
            Value::String(text) => parse_literal(text).unwrap_or_else(|| value.clone()),
            other => other.clone(),
        })
        .collect()
}

/// Parse a complete Python-style constant literal, or `None` if the text is
/// anything else (trailing garbage counts as a failure).
pub fn parse_literal(text: &str) -> Option<Value> {
    let mut parser = LiteralParser::new(text);
    parser.skip_whitespace();
    let value = parser.parse_value()?;
    parser.skip_whitespace();
    if parser.at_end() {
        Some(value)
    } else {
        None
    }
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralParser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> Option<()> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> Option<()> {
        for expected in keyword.chars() {
            if self.bump()? != expected {
                return None;
            }
        }
        Some(())
    }

    fn parse_value(&mut self) -> Option<Value> {
        match self.peek()? {
            '\'' | '"' => self.parse_string().map(Value::String),
            '[' => self.parse_list(),
            '(' => self.parse_tuple(),
            '{' => self.parse_dict(),
            'T' => {
                self.eat_keyword("True")?;
                Some(Value::Bool(true))
            }
            'F' => {
                self.eat_keyword("False")?;
                Some(Value::Bool(false))
            }
            'N' => {
                self.eat_keyword("None")?;
                Some(Value::Null)
            }
            '+' | '-' | '.' | '0'..='9' => self.parse_number(),
            _ => None,
        }
    }

    fn parse_string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            let c = self.bump()?;
            if c == quote {
                return Some(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            match self.bump()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                'x' => out.push(self.parse_hex_escape(2)?),
                'u' => out.push(self.parse_hex_escape(4)?),
                // Unrecognized escape: refuse rather than guess.
                _ => return None,
            }
        }
    }

    fn parse_hex_escape(&mut self, digits: usize) -> Option<char> {
        let mut code = 0u32;
        for _ in 0..digits {
            code = code * 16 + self.bump()?.to_digit(16)?;
        }
        char::from_u32(code)
    }

    fn parse_number(&mut self) -> Option<Value> {
        let mut negative = false;
        if let Some(sign @ ('+' | '-')) = self.peek() {
            negative = sign == '-';
            self.pos += 1;
        }

        // Radix-prefixed integers: 0x / 0o / 0b, as Python literals allow.
        if self.peek() == Some('0') {
            let radix = match self.chars.get(self.pos + 1) {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.pos += 2;
                return self.parse_radix_integer(radix, negative);
            }
        }

        let start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => self.pos += 1,
                '.' => {
                    is_float = true;
                    self.pos += 1;
                }
                'e' | 'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some('+') | Some('-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        let digits = strip_underscores(&raw, |c| c.is_ascii_digit())?;
        let text = if negative { format!("-{digits}") } else { digits };
        if is_float {
            let parsed: f64 = text.parse().ok()?;
            serde_json::Number::from_f64(parsed).map(Value::Number)
        } else if let Ok(n) = text.parse::<i64>() {
            Some(Value::from(n))
        } else {
            // Out of i64 range; try unsigned before giving up.
            text.parse::<u64>().ok().map(Value::from)
        }
    }

    fn parse_radix_integer(&mut self, radix: u32, negative: bool) -> Option<Value> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        // Python permits one underscore directly after the base prefix.
        let raw = match raw.strip_prefix('_') {
            Some(rest) if rest.chars().next().is_some_and(|c| c.is_digit(radix)) => rest,
            Some(_) => return None,
            None => raw.as_str(),
        };
        let digits = strip_underscores(raw, |c| c.is_digit(radix))?;
        if digits.is_empty() {
            return None;
        }
        let magnitude = i64::from_str_radix(&digits, radix).ok()?;
        Some(Value::from(if negative { -magnitude } else { magnitude }))
    }

    fn parse_list(&mut self) -> Option<Value> {
        self.eat('[')?;
        let items = self.parse_items(']')?;
        Some(Value::Array(items))
    }

    // A parenthesized single value without a comma is just that value, the
    // same way Python reads `(1)` as 1 and `(1,)` as a tuple.
    fn parse_tuple(&mut self) -> Option<Value> {
        self.eat('(')?;
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Some(Value::Array(Vec::new()));
        }
        let first = self.parse_value()?;
        self.skip_whitespace();
        match self.peek()? {
            ')' => {
                self.pos += 1;
                Some(first)
            }
            ',' => {
                self.pos += 1;
                let mut items = vec![first];
                items.extend(self.parse_items(')')?);
                Some(Value::Array(items))
            }
            _ => None,
        }
    }

    fn parse_items(&mut self, close: char) -> Option<Vec<Value>> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Some(items);
            }
            items.push(self.parse_value()?);
            self.skip_whitespace();
            match self.peek()? {
                ',' => self.pos += 1,
                c if c == close => {
                    self.pos += 1;
                    return Some(items);
                }
                _ => return None,
            }
        }
    }

    fn parse_dict(&mut self) -> Option<Value> {
        self.eat('{')?;
        let mut map = serde_json::Map::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Some(Value::Object(map));
            }
            // Only string keys are representable as a mapping; anything else
            // (including set literals) is not a supported constant.
            let key = match self.peek()? {
                '\'' | '"' => self.parse_string()?,
                _ => return None,
            };
            self.skip_whitespace();
            self.eat(':')?;
            self.skip_whitespace();
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_whitespace();
            match self.peek()? {
                ',' => self.pos += 1,
                '}' => {
                    self.pos += 1;
                    return Some(Value::Object(map));
                }
                _ => return None,
            }
        }
    }
}

// Underscores are digit-group separators and must sit between two digits,
// as in Python: "1_000" is fine, "1_", "1__0" and "1_.5" are not.
fn strip_underscores(raw: &str, is_digit: impl Fn(char) -> bool) -> Option<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if c != '_' {
            out.push(c);
            continue;
        }
        let before = i.checked_sub(1).and_then(|j| chars.get(j));
        let after = chars.get(i + 1);
        match (before, after) {
            (Some(&b), Some(&a)) if is_digit(b) && is_digit(a) => {}
            _ => return None,
        }
    }
    Some(out)
}
