//! The bytecode interpreter loop.
//!
//! [`Interpreter::run`] executes at most `budget` instructions of one
//! process against its private heap and stack. It never blocks and never
//! yields mid-instruction. Requests that reach beyond the process (spawn,
//! bind, dispatch, print) go through [`ProcessHost`].

use tracing::{trace, warn};
use types::{bytes, Addr, Config, ProcessId};

use crate::error::{ExecutionError, MemoryError};
use crate::heap::Heap;
use crate::host::ProcessHost;
use crate::image::ProgramImage;
use crate::opcode::Opcode;
use crate::stack::Stack;

/// How a quantum ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The budget ran out with instructions left to execute.
    Yielded,
    /// The cursor reached the end of the image with no frame to return to.
    Finished,
    /// `HALT` was executed.
    Halt { recursive: bool },
}

pub struct Interpreter<'a, H: ProcessHost + ?Sized> {
    host: &'a H,
    origin: ProcessId,
    image: &'a ProgramImage,
    heap: &'a mut Heap,
    stack: &'a mut Stack,
}

impl<'a, H: ProcessHost + ?Sized> Interpreter<'a, H> {
    pub fn new(
        host: &'a H,
        origin: ProcessId,
        image: &'a ProgramImage,
        heap: &'a mut Heap,
        stack: &'a mut Stack,
    ) -> Self {
        Self {
            host,
            origin,
            image,
            heap,
            stack,
        }
    }

    /// Run up to `budget` instructions starting at `*cursor`, an offset from
    /// the image start. The cursor is left at the next instruction.
    pub fn run(&mut self, cursor: &mut u32, budget: u32) -> Result<StepOutcome, ExecutionError> {
        let len = self.image.len();
        let mut executed = 0;

        while executed < budget {
            if *cursor >= len {
                if self.stack.frame_depth() == 0 {
                    return Ok(StepOutcome::Finished);
                }
                *cursor = self.stack.pop_frame()?;
                trace!(pid = %self.origin, cursor = *cursor, "implicit return");
                continue;
            }

            executed += 1;
            if let Some(outcome) = self.step(cursor)? {
                return Ok(outcome);
            }
        }

        if *cursor >= len && self.stack.frame_depth() == 0 {
            Ok(StepOutcome::Finished)
        } else {
            Ok(StepOutcome::Yielded)
        }
    }

    fn operand<const N: usize>(&self, opcode: Opcode, offset: u32) -> Result<[u8; N], ExecutionError> {
        let end = offset as u64 + N as u64;
        if end > u64::from(self.image.len()) {
            return Err(ExecutionError::UnexpectedEnd { opcode, offset });
        }
        let addr = self
            .image
            .address_of(offset)
            .ok_or(ExecutionError::UnexpectedEnd { opcode, offset })?;
        let raw = self.image.arena().read_bytes(addr, N as u32)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&raw);
        Ok(out)
    }

    fn operand_i32(&self, opcode: Opcode, cursor: &mut u32) -> Result<i32, ExecutionError> {
        let value = i32::from_be_bytes(self.operand::<4>(opcode, *cursor)?);
        *cursor += 4;
        Ok(value)
    }

    fn operand_u16(&self, opcode: Opcode, cursor: &mut u32) -> Result<u16, ExecutionError> {
        let value = u16::from_be_bytes(self.operand::<2>(opcode, *cursor)?);
        *cursor += 2;
        Ok(value)
    }

    fn pop_pid(&mut self) -> Result<ProcessId, ExecutionError> {
        let raw = self.stack.pop()?;
        ProcessId::from_slot(raw).ok_or(ExecutionError::InvalidProcessId(raw))
    }

    fn binary(&mut self, op: impl FnOnce(i64, i64) -> i64) -> Result<(), ExecutionError> {
        let lhs = self.stack.pop()?;
        let rhs = self.stack.pop()?;
        self.stack.push(op(lhs, rhs))
    }

    fn compare(&mut self, op: impl FnOnce(i64, i64) -> bool) -> Result<(), ExecutionError> {
        self.binary(|lhs, rhs| i64::from(op(lhs, rhs)))
    }

    fn divide(
        &mut self,
        offset: u32,
        op: impl FnOnce(i64, i64) -> i64,
    ) -> Result<(), ExecutionError> {
        let lhs = self.stack.pop()?;
        let rhs = self.stack.pop()?;
        if rhs == 0 {
            return Err(ExecutionError::DivisionByZero { offset });
        }
        self.stack.push(op(lhs, rhs))
    }

    fn step(&mut self, cursor: &mut u32) -> Result<Option<StepOutcome>, ExecutionError> {
        let offset = *cursor;
        let addr = self.image.address_of(offset).ok_or(ExecutionError::InvalidJump {
            target: i64::from(offset),
            len: self.image.len(),
        })?;
        let raw = self.image.arena().get_u8(addr)?;
        let opcode = Opcode::from_u8(raw).ok_or(ExecutionError::UnknownOpcode { opcode: raw, offset })?;
        *cursor += 1;

        trace!(pid = %self.origin, offset, op = opcode.mnemonic(), depth = self.stack.len(), "step");

        use Opcode::*;
        match opcode {
            Push => {
                let value = self.operand_i32(opcode, cursor)?;
                self.stack.push(i64::from(value))?;
            }
            Lpsh => {
                let value = i64::from_be_bytes(self.operand::<8>(opcode, *cursor)?);
                *cursor += 8;
                self.stack.push(value)?;
            }
            Proc => {
                let priority = self.operand_i32(opcode, cursor)?;
                let name_len = self.operand_u16(opcode, cursor)?;
                let name = self.literal(opcode, *cursor, u32::from(name_len))?;
                *cursor += u32::from(name_len);

                let child = self
                    .host
                    .spawn(self.origin, u32::try_from(priority).unwrap_or(0), name)?;
                self.stack.push(child.to_slot())?;
            }
            ProcFun => {
                let target = self.pop_pid()?;
                let entry = self.operand_i32(opcode, cursor)?;
                let entry = u32::try_from(entry)
                    .ok()
                    .filter(|e| *e < self.image.len())
                    .ok_or(ExecutionError::InvalidJump {
                        target: i64::from(entry),
                        len: self.image.len(),
                    })?;
                self.host.bind_image(target, self.image.with_entry(entry))?;
            }
            Prce => {
                let target = self.pop_pid()?;
                self.host.dispatch(target)?;
            }
            Add => self.binary(i64::wrapping_add)?,
            Sub => self.binary(i64::wrapping_sub)?,
            Mul => self.binary(i64::wrapping_mul)?,
            Div => self.divide(offset, i64::wrapping_div)?,
            Mod => self.divide(offset, i64::wrapping_rem)?,
            Equals => self.compare(|a, b| a == b)?,
            LogAnd => self.compare(|a, b| a > 0 && b > 0)?,
            LogOr => self.compare(|a, b| a > 0 || b > 0)?,
            LogShift => self.binary(|a, b| ((a as u64) >> (b as u32 & 63)) as i64)?,
            And => self.binary(|a, b| a & b)?,
            Or => self.binary(|a, b| a | b)?,
            Xor => self.binary(|a, b| a ^ b)?,
            Not => {
                let value = self.stack.pop()?;
                self.stack.push(!value)?;
            }
            LShift => self.binary(|a, b| a.wrapping_shl(b as u32))?,
            RShift => self.binary(|a, b| a.wrapping_shr(b as u32))?,
            CmpG => self.compare(|a, b| a > b)?,
            CmpL => self.compare(|a, b| a < b)?,
            CmpGe => self.compare(|a, b| a >= b)?,
            CmpLe => self.compare(|a, b| a <= b)?,
            IStore | ILoad | Dref | Aref => {
                trace!(pid = %self.origin, op = opcode.mnemonic(), "reserved opcode ignored");
            }
            Jump => {
                let target = self.operand_i32(opcode, cursor)?;
                *cursor = u32::try_from(target)
                    .ok()
                    .filter(|t| *t <= self.image.len())
                    .ok_or(ExecutionError::InvalidJump {
                        target: i64::from(target),
                        len: self.image.len(),
                    })?;
            }
            If => {
                let condition = self.stack.pop()? > 0;
                trace!(pid = %self.origin, condition, "IF has no branch target, falling through");
            }
            APush => {
                let len = self.operand_u16(opcode, cursor)?;
                let addr = self.push_literal(opcode, *cursor, u32::from(len))?;
                *cursor += u32::from(len);
                self.stack.push(addr.to_slot())?;
            }
            Print => {
                let raw = self.stack.pop()?;
                let addr = Addr::from_slot(raw)
                    .ok_or(MemoryError::InvalidPointer(Addr::new(raw as u32)))?;
                let text = if addr.is_null() {
                    Vec::new()
                } else {
                    self.heap.read_array(addr)?
                };
                self.host.print(self.origin, &String::from_utf8_lossy(&text));
            }
            Pop => {
                self.stack.pop()?;
            }
            Call => {
                let word = self.stack.pop()? as u32;
                let tag = bytes::first_byte(word);
                let address = word & Config::CALL_ADDRESS_MASK;
                if address >= self.image.len() {
                    return Err(ExecutionError::InvalidCall {
                        tag,
                        address,
                        len: self.image.len(),
                    });
                }
                warn!(pid = %self.origin, tag, address, "CALL dispatch is not implemented, ignoring");
            }
            Halt => {
                let flag = self.stack.pop()?;
                return Ok(Some(StepOutcome::Halt { recursive: flag == 0 }));
            }
        }

        Ok(None)
    }

    fn literal(&self, opcode: Opcode, offset: u32, len: u32) -> Result<Vec<u8>, ExecutionError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        if u64::from(offset) + u64::from(len) > u64::from(self.image.len()) {
            return Err(ExecutionError::UnexpectedEnd { opcode, offset });
        }
        let addr = self
            .image
            .address_of(offset)
            .ok_or(ExecutionError::UnexpectedEnd { opcode, offset })?;
        Ok(self.image.arena().read_bytes(addr, len)?)
    }

    /// Copy an inline literal into a fresh heap allocation. An empty literal
    /// yields the null address.
    fn push_literal(&mut self, opcode: Opcode, offset: u32, len: u32) -> Result<Addr, ExecutionError> {
        if len == 0 {
            return Ok(Addr::NULL);
        }
        if u64::from(offset) + u64::from(len) > u64::from(self.image.len()) {
            return Err(ExecutionError::UnexpectedEnd { opcode, offset });
        }
        let src = self
            .image
            .address_of(offset)
            .ok_or(ExecutionError::UnexpectedEnd { opcode, offset })?;
        let addr = self.heap.malloc(len)?;
        self.heap.write_from_arena(addr, src, len)?;
        Ok(addr)
    }
}
