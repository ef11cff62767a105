use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{Core, Owner, normalize};
use crate::error::CoreError;
use crate::word::{AddressField, Cond, OFFSET_MAX, OFFSET_MIN, Opcode, Word, encode};

/// One source line after comment stripping: its 1-based number, any
/// `name:` labels that prefixed it, and the remaining body text.
struct Line<'a> {
    number: usize,
    labels: Vec<&'a str>,
    body: &'a str,
}

impl Core {
    /// Assemble `source` into the store starting at `start`, stamping
    /// `owner` on every emitted word. Returns the number of words
    /// emitted.
    ///
    /// Errors abort at the failing line; words already emitted in this
    /// call stay in the store. Callers that need atomicity assemble
    /// into a scratch store first and copy on success.
    pub fn assemble(
        &mut self,
        source: &str,
        start: i64,
        owner: &Arc<Owner>,
    ) -> Result<usize, CoreError> {
        let lines = scan(source);
        let table = bind_labels(&lines)?;
        let emitted = emit(self, &lines, &table, start, owner)?;
        self.bind_labels(rebase(&table, start, self.size()));
        Ok(emitted)
    }
}

/// Split the source into lines, strip `;` comments and `name:` label
/// prefixes. Fully blank lines are dropped.
fn scan(source: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        let mut body = raw.split(';').next().unwrap_or("").trim();
        let mut labels = Vec::new();
        while let Some(token) = body.split_whitespace().next() {
            let Some(name) = token.strip_suffix(':') else {
                break;
            };
            labels.push(name);
            body = body[token.len()..].trim_start();
        }
        if !labels.is_empty() || !body.is_empty() {
            lines.push(Line {
                number: idx + 1,
                labels,
                body,
            });
        }
    }
    lines
}

fn is_label_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Pass 1: bind every label to its assembly-relative position (0-based
/// count of emitting lines). Label-only lines do not advance the count.
fn bind_labels(lines: &[Line]) -> Result<HashMap<String, usize>, CoreError> {
    let mut table = HashMap::new();
    let mut position = 0usize;
    for line in lines {
        for &name in &line.labels {
            if !is_label_name(name) {
                return Err(CoreError::Syntax {
                    line: line.number,
                    msg: format!("invalid label name `{name}`"),
                });
            }
            if table.insert(name.to_string(), position).is_some() {
                return Err(CoreError::Redefinition {
                    line: line.number,
                    name: name.to_string(),
                });
            }
        }
        if !line.body.is_empty() {
            position += 1;
        }
    }
    Ok(table)
}

/// Pass 2: re-walk the lines, resolve every address and label reference
/// against the table, and write packed words into the store. Writes
/// happen line by line, so words emitted before an error remain.
fn emit(
    core: &mut Core,
    lines: &[Line],
    table: &HashMap<String, usize>,
    start: i64,
    owner: &Arc<Owner>,
) -> Result<usize, CoreError> {
    let mut position = 0usize;
    for line in lines {
        if line.body.is_empty() {
            continue;
        }
        let word = encode_line(line, table, position)?;
        core.write(start + position as i64, word, owner);
        position += 1;
    }
    Ok(position)
}

/// Pass 3: rebase the relative table to absolute wrapped addresses.
/// The result is retained for display only.
fn rebase(table: &HashMap<String, usize>, start: i64, size: usize) -> HashMap<String, usize> {
    table
        .iter()
        .map(|(name, &position)| (name.clone(), normalize(start + position as i64, size)))
        .collect()
}

/// Encode one emitting line: either an instruction
/// `[IF.<cond> <addr>] <OP> <target> <source1> <source2>` or a literal
/// arithmetic expression producing one word.
fn encode_line(
    line: &Line,
    table: &HashMap<String, usize>,
    position: usize,
) -> Result<Word, CoreError> {
    let tokens: Vec<&str> = line.body.split_whitespace().collect();
    let first = tokens[0].to_ascii_uppercase();

    if let Some(cond_mnemonic) = first.strip_prefix("IF.") {
        let cond = Cond::from_mnemonic(cond_mnemonic).ok_or_else(|| CoreError::Syntax {
            line: line.number,
            msg: format!("unknown condition `{cond_mnemonic}`"),
        })?;
        if tokens.len() != 6 {
            return Err(malformed(line));
        }
        let cond_addr = parse_address(tokens[1], table, position, line.number)?;
        let op = parse_opcode(tokens[2], line.number)?;
        return encode_instruction(&tokens[3..], op, cond, cond_addr, table, position, line.number);
    }

    if let Some(op) = Opcode::from_mnemonic(tokens[0]) {
        if tokens.len() != 4 {
            return Err(malformed(line));
        }
        return encode_instruction(
            &tokens[1..],
            op,
            Cond::NonZero,
            AddressField::DIRECT_ZERO,
            table,
            position,
            line.number,
        );
    }

    // Four bare words led by an identifier reads as an instruction with
    // an operator we don't know, not as arithmetic.
    if tokens.len() == 4 && is_label_name(tokens[0]) {
        return Err(CoreError::Syntax {
            line: line.number,
            msg: format!("unknown operator `{}`", tokens[0]),
        });
    }

    eval_expr(line.body, table, line.number)
}

fn malformed(line: &Line) -> CoreError {
    CoreError::Syntax {
        line: line.number,
        msg: format!("malformed line `{}`", line.body),
    }
}

fn parse_opcode(token: &str, line: usize) -> Result<Opcode, CoreError> {
    Opcode::from_mnemonic(token).ok_or_else(|| CoreError::Syntax {
        line,
        msg: format!("unknown operator `{token}`"),
    })
}

fn encode_instruction(
    addr_tokens: &[&str],
    op: Opcode,
    cond: Cond,
    cond_addr: AddressField,
    table: &HashMap<String, usize>,
    position: usize,
    line: usize,
) -> Result<Word, CoreError> {
    let target = parse_address(addr_tokens[0], table, position, line)?;
    let source1 = parse_address(addr_tokens[1], table, position, line)?;
    let source2 = parse_address(addr_tokens[2], table, position, line)?;
    Ok(encode(op as u8, cond, cond_addr, target, source1, source2))
}

/// Parse one address operand: `N` direct, `@N` indirect, where `N` is a
/// signed offset or a label resolving to (label position − this
/// position). `$` anything is the immediate mode this architecture
/// refuses to have.
fn parse_address(
    token: &str,
    table: &HashMap<String, usize>,
    position: usize,
    line: usize,
) -> Result<AddressField, CoreError> {
    let (indirect, rest) = match token.strip_prefix('@') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    if rest.starts_with('$') {
        return Err(CoreError::Immediate { line });
    }
    let offset: i64 = if let Ok(n) = rest.parse::<i64>() {
        n
    } else if is_label_name(rest) {
        let &label_position = table.get(rest).ok_or_else(|| CoreError::Reference {
            line,
            name: rest.to_string(),
        })?;
        label_position as i64 - position as i64
    } else {
        return Err(CoreError::Syntax {
            line,
            msg: format!("bad address `{token}`"),
        });
    };
    if !(OFFSET_MIN..=OFFSET_MAX).contains(&offset) {
        return Err(CoreError::Range { line, offset });
    }
    Ok(AddressField {
        indirect,
        offset: offset as i8,
    })
}

/// Recursive-descent evaluator for literal lines: integers and bound
/// labels (valued at their relative positions) combined with `+ - * /`
/// and parentheses. Emits one word; overlong values wrap at the word
/// width like every other unmasked value.
fn eval_expr(text: &str, table: &HashMap<String, usize>, line: usize) -> Result<Word, CoreError> {
    let mut parser = ExprParser {
        src: text,
        input: text.as_bytes(),
        pos: 0,
        table,
        line,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos != parser.input.len() {
        return Err(CoreError::Syntax {
            line,
            msg: format!("malformed line `{text}`"),
        });
    }
    Ok(value as Word)
}

struct ExprParser<'a> {
    src: &'a str,
    input: &'a [u8],
    pos: usize,
    table: &'a HashMap<String, usize>,
    line: usize,
}

impl ExprParser<'_> {
    fn skip_ws(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.input.get(self.pos).copied()
    }

    fn syntax(&self, msg: String) -> CoreError {
        CoreError::Syntax {
            line: self.line,
            msg,
        }
    }

    fn expr(&mut self) -> Result<i64, CoreError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    value = value.wrapping_add(self.term()?);
                }
                Some(b'-') => {
                    self.pos += 1;
                    value = value.wrapping_sub(self.term()?);
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<i64, CoreError> {
        let mut value = self.factor()?;
        loop {
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    value = value.wrapping_mul(self.factor()?);
                }
                Some(b'/') => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    value = value
                        .checked_div(divisor)
                        .ok_or_else(|| self.syntax("division by zero".to_string()))?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<i64, CoreError> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(b')') {
                    return Err(self.syntax("expected `)`".to_string()));
                }
                self.pos += 1;
                Ok(value)
            }
            Some(b'-') => {
                self.pos += 1;
                Ok(self.factor()?.wrapping_neg())
            }
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while self
                    .input
                    .get(self.pos)
                    .is_some_and(|b| b.is_ascii_digit())
                {
                    self.pos += 1;
                }
                let digits = &self.src[start..self.pos];
                digits
                    .parse::<i64>()
                    .map_err(|_| self.syntax(format!("number `{digits}` out of range")))
            }
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                let start = self.pos;
                while self
                    .input
                    .get(self.pos)
                    .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
                {
                    self.pos += 1;
                }
                let name = &self.src[start..self.pos];
                self.table
                    .get(name)
                    .map(|&position| position as i64)
                    .ok_or_else(|| CoreError::Reference {
                        line: self.line,
                        name: name.to_string(),
                    })
            }
            Some(c) => Err(self.syntax(format!("unexpected `{}`", c as char))),
            None => Err(self.syntax("unexpected end of line".to_string())),
        }
    }
}
