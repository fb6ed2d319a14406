//! Chunk disassembler
//!
//! Renders compiled code one instruction per line, with the byte offset,
//! source line, mnemonic, and decoded operand. Used by the CLI `dump`
//! subcommand and handy in tests.

use std::io::{self, Write};

use crate::chunk::{Chunk, Opcode};
use crate::function::Function;

enum Operand {
    None,
    Byte,
    Word,
}

fn operand_kind(op: Opcode) -> Operand {
    match op {
        Opcode::Constant
        | Opcode::Array
        | Opcode::Struct
        | Opcode::Instance
        | Opcode::Construct
        | Opcode::Closure
        | Opcode::UnpackArray
        | Opcode::UnpackStruct
        | Opcode::Global
        | Opcode::Nonlocal
        | Opcode::Load
        | Opcode::Store
        | Opcode::GetField
        | Opcode::FetchField
        | Opcode::PutField
        | Opcode::InplacePutField
        | Opcode::Call => Operand::Byte,
        Opcode::Int
        | Opcode::Jump
        | Opcode::JumpIfFalse
        | Opcode::JumpIfTrue
        | Opcode::JumpIfTrueOrPop
        | Opcode::JumpIfFalseOrPop
        | Opcode::JumpIfNotEqual
        | Opcode::JumpIfNotValid => Operand::Word,
        _ => Operand::None,
    }
}

pub fn disassemble_chunk<W: Write>(chunk: &Chunk, w: &mut W) -> io::Result<()> {
    let code = chunk.code();
    let mut offset = 0usize;
    while offset < code.len() {
        let line = chunk.line_for(offset as i32);
        let Some(op) = Opcode::from_byte(code[offset]) else {
            writeln!(w, "{:4}  {offset:04}  <bad opcode {}>", line, code[offset])?;
            offset += 1;
            continue;
        };
        write!(w, "{:4}  {offset:04}  {}", line, op.mnemonic())?;
        offset += 1;
        match operand_kind(op) {
            Operand::None => {}
            Operand::Byte => {
                write!(w, " {}", code[offset])?;
                offset += 1;
            }
            Operand::Word => {
                let word = u16::from_le_bytes([code[offset], code[offset + 1]]);
                let rendered = if op == Opcode::Int {
                    (word as i16) as i32
                } else {
                    word as i32
                };
                write!(w, " {rendered}")?;
                offset += 2;
            }
        }
        writeln!(w)?;
    }
    if !chunk.consts().is_empty() {
        writeln!(w, "constants:")?;
        for (index, value) in chunk.consts().iter().enumerate() {
            writeln!(w, "  {index}: {value:#}")?;
        }
    }
    Ok(())
}

pub fn disassemble<W: Write>(function: &Function, w: &mut W) -> io::Result<()> {
    let name = function
        .name
        .as_ref()
        .map(|n| n.to_string())
        .unwrap_or_else(|| "<anonymous>".into());
    writeln!(
        w,
        "fn {name}/{} in {} ({} nonlocals)",
        function.arity, function.file, function.num_nonlocals
    )?;
    disassemble_chunk(&function.chunk, w)?;
    for child in &function.functions {
        writeln!(w)?;
        disassemble(child, w)?;
    }
    Ok(())
}
