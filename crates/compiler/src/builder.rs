use std::collections::HashMap;

use types::SerializeField;
use vm::Opcode;

use crate::error::AssembleError;

/// Emits a program image one instruction at a time.
///
/// Offsets used by `JUMP` and `PROCFUN` may be given as labels and are
/// resolved by [`ProgramBuilder::build`].
#[derive(Debug, Default, Clone)]
pub struct ProgramBuilder {
    code: Vec<u8>,
    labels: HashMap<String, u32>,
    fixups: Vec<(usize, String)>,
    errors: Vec<AssembleError>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset the next instruction will be emitted at.
    pub fn offset(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn label(&mut self, name: &str) -> &mut Self {
        let offset = self.offset();
        if self.labels.insert(name.to_string(), offset).is_some() {
            self.errors.push(AssembleError::DuplicateLabel(name.to_string()));
        }
        self
    }

    /// Any operand-free instruction.
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        opcode.as_u8().serialize_field(&mut self.code);
        self
    }

    pub fn push(&mut self, value: i32) -> &mut Self {
        self.op(Opcode::Push);
        value.serialize_field(&mut self.code);
        self
    }

    pub fn lpsh(&mut self, value: i64) -> &mut Self {
        self.op(Opcode::Lpsh);
        value.serialize_field(&mut self.code);
        self
    }

    /// `PROC`: spawn a child with the given priority and name.
    pub fn spawn(&mut self, priority: i32, name: &[u8]) -> &mut Self {
        self.op(Opcode::Proc);
        priority.serialize_field(&mut self.code);
        self.literal(name)
    }

    pub fn procfun(&mut self, label: &str) -> &mut Self {
        self.op(Opcode::ProcFun);
        self.fixup(label)
    }

    pub fn procfun_at(&mut self, offset: u32) -> &mut Self {
        self.op(Opcode::ProcFun);
        offset.serialize_field(&mut self.code);
        self
    }

    pub fn prce(&mut self) -> &mut Self {
        self.op(Opcode::Prce)
    }

    pub fn jump(&mut self, label: &str) -> &mut Self {
        self.op(Opcode::Jump);
        self.fixup(label)
    }

    pub fn jump_to(&mut self, offset: u32) -> &mut Self {
        self.op(Opcode::Jump);
        offset.serialize_field(&mut self.code);
        self
    }

    pub fn apush(&mut self, bytes: &[u8]) -> &mut Self {
        self.op(Opcode::APush);
        self.literal(bytes)
    }

    /// `APUSH` + `PRINT`.
    pub fn print_str(&mut self, text: &str) -> &mut Self {
        self.apush(text.as_bytes()).op(Opcode::Print)
    }

    /// Push the halt flag and `HALT`. `subtree` halts every descendant too.
    pub fn halt(&mut self, subtree: bool) -> &mut Self {
        self.push(if subtree { 0 } else { 1 }).op(Opcode::Halt)
    }

    fn literal(&mut self, bytes: &[u8]) -> &mut Self {
        match u16::try_from(bytes.len()) {
            Ok(len) => {
                len.serialize_field(&mut self.code);
                bytes.serialize_field(&mut self.code);
            }
            Err(_) => {
                self.errors.push(AssembleError::LiteralTooLong { len: bytes.len() });
                0u16.serialize_field(&mut self.code);
            }
        }
        self
    }

    fn fixup(&mut self, label: &str) -> &mut Self {
        self.fixups.push((self.code.len(), label.to_string()));
        0u32.serialize_field(&mut self.code);
        self
    }

    /// Resolve labels and return the finished image.
    pub fn build(&self) -> Result<Vec<u8>, AssembleError> {
        if let Some(err) = self.errors.first() {
            return Err(err.clone());
        }
        if u32::try_from(self.code.len()).is_err() {
            return Err(AssembleError::ImageTooLarge { len: self.code.len() });
        }

        let mut code = self.code.clone();
        for (at, label) in &self.fixups {
            let target = self
                .labels
                .get(label)
                .ok_or_else(|| AssembleError::UnknownLabel(label.clone()))?;
            code[*at..*at + 4].copy_from_slice(&target.to_be_bytes());
        }
        Ok(code)
    }
}
