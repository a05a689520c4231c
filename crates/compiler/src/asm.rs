//! Text assembler.
//!
//! One instruction per line, mnemonics as in the opcode table and case
//! insensitive. `;` starts a comment. A leading `name:` defines a label.
//!
//! ```text
//! start:
//!     PUSH 4
//!     PUSH 8
//!     MUL
//!     APUSH "done"
//!     PRINT
//!     JUMP start
//! ```
//!
//! Integers are decimal or `0x` hex. `PUSH` accepts any value that fits in
//! 32 bits, signed or not. Strings are double quoted with `\n`, `\"` and
//! `\\` escapes.

use vm::Opcode;

use crate::builder::ProgramBuilder;
use crate::error::AssembleError;

pub fn assemble(source: &str) -> Result<Vec<u8>, AssembleError> {
    let mut builder = ProgramBuilder::new();

    for (idx, raw) in source.lines().enumerate() {
        let line = idx + 1;
        let mut rest = strip_comment(raw).trim();

        if let Some((head, tail)) = rest.split_once(':') {
            if is_label(head.trim()) && !head.contains('"') {
                builder.label(head.trim());
                rest = tail.trim();
            }
        }
        if rest.is_empty() {
            continue;
        }

        let (mnemonic, operands) = match rest.split_once(char::is_whitespace) {
            Some((m, o)) => (m, o.trim()),
            None => (rest, ""),
        };
        let opcode = lookup(mnemonic).ok_or_else(|| AssembleError::UnknownMnemonic {
            line,
            text: mnemonic.to_string(),
        })?;

        emit(&mut builder, opcode, operands, line)?;
    }

    builder.build()
}

fn emit(builder: &mut ProgramBuilder, opcode: Opcode, operands: &str, line: usize) -> Result<(), AssembleError> {
    let invalid = |text: &str| AssembleError::InvalidOperand {
        line,
        text: text.to_string(),
    };
    let missing = AssembleError::MissingOperand {
        line,
        mnemonic: opcode.mnemonic(),
    };

    match opcode {
        Opcode::Push => {
            let value = parse_int(operands).ok_or(if operands.is_empty() { missing } else { invalid(operands) })?;
            let value = i32::try_from(value)
                .or_else(|_| u32::try_from(value).map(|v| v as i32))
                .map_err(|_| invalid(operands))?;
            builder.push(value);
        }
        Opcode::Lpsh => {
            let value = parse_int(operands).ok_or(if operands.is_empty() { missing } else { invalid(operands) })?;
            builder.lpsh(value);
        }
        Opcode::Proc => {
            let (priority, name) = operands.split_once(char::is_whitespace).ok_or(missing)?;
            let priority = parse_int(priority)
                .and_then(|p| i32::try_from(p).ok())
                .ok_or_else(|| invalid(priority))?;
            let name = parse_string(name.trim()).ok_or_else(|| invalid(name))?;
            builder.spawn(priority, &name);
        }
        Opcode::ProcFun | Opcode::Jump => {
            if operands.is_empty() {
                return Err(missing);
            }
            match parse_int(operands) {
                Some(offset) => {
                    let offset = u32::try_from(offset).map_err(|_| invalid(operands))?;
                    if opcode == Opcode::Jump {
                        builder.jump_to(offset);
                    } else {
                        builder.procfun_at(offset);
                    }
                }
                None if is_label(operands) => {
                    if opcode == Opcode::Jump {
                        builder.jump(operands);
                    } else {
                        builder.procfun(operands);
                    }
                }
                None => return Err(invalid(operands)),
            }
        }
        Opcode::APush => {
            if operands.is_empty() {
                return Err(missing);
            }
            let bytes = parse_string(operands).ok_or_else(|| invalid(operands))?;
            builder.apush(&bytes);
        }
        _ => {
            if !operands.is_empty() {
                return Err(invalid(operands));
            }
            builder.op(opcode);
        }
    }
    Ok(())
}

fn lookup(mnemonic: &str) -> Option<Opcode> {
    (0..=u8::MAX)
        .filter_map(Opcode::from_u8)
        .find(|op| op.mnemonic().eq_ignore_ascii_case(mnemonic))
}

fn is_label(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => return &line[..i],
            _ => {}
        }
    }
    line
}

fn parse_int(text: &str) -> Option<i64> {
    let text = text.replace('_', "");
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.as_str()),
    };
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).ok()
}

fn parse_string(text: &str) -> Option<Vec<u8>> {
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = Vec::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        let c = match c {
            '\\' => match chars.next()? {
                'n' => '\n',
                't' => '\t',
                '"' => '"',
                '\\' => '\\',
                _ => return None,
            },
            '"' => return None,
            c => c,
        };
        let mut buf = [0u8; 4];
        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }
    Some(out)
}
