use super::pool::Reader;
use super::{ClassFileError, Constant, ConstantPool};

/// One pool reference attributed to a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeRef {
    /// Operand of `new`, `anewarray`, `checkcast`, `instanceof`,
    /// `multianewarray` — the raw internal name, which may be an array
    /// descriptor.
    Type(String),
    /// Target of an `invoke*` instruction.
    Call { owner: String, name: String },
    /// A class literal loaded by `ldc`/`ldc_w`.
    ClassConstant(String),
    /// Declared type of a local variable, from the `LocalVariableTable`.
    LocalType(String),
}

/// Parsed layout of a `Code` attribute: the bytecode itself, the exception
/// table's catch-type pool indices, and the nested attributes.
pub struct CodeAttribute<'a> {
    pub code: &'a [u8],
    pub catch_types: Vec<u16>,
    pub attributes: Vec<(u16, &'a [u8])>,
}

pub fn parse_code_attribute(data: &[u8]) -> Result<CodeAttribute<'_>, ClassFileError> {
    let mut r = Reader::new(data);
    let _max_stack = r.u16()?;
    let _max_locals = r.u16()?;
    let code_len = r.u32()? as usize;
    let code = r.bytes(code_len)?;
    let exception_count = r.u16()? as usize;
    let mut catch_types = Vec::new();
    for _ in 0..exception_count {
        let _start = r.u16()?;
        let _end = r.u16()?;
        let _handler = r.u16()?;
        let catch_type = r.u16()?;
        if catch_type != 0 {
            catch_types.push(catch_type);
        }
    }
    let attr_count = r.u16()? as usize;
    let mut attributes = Vec::with_capacity(attr_count);
    for _ in 0..attr_count {
        let name_index = r.u16()?;
        let len = r.u32()? as usize;
        attributes.push((name_index, r.bytes(len)?));
    }
    Ok(CodeAttribute {
        code,
        catch_types,
        attributes,
    })
}

/// Walks the bytecode of one `Code` attribute and reports every pool
/// reference an instruction makes, plus local-variable declared types.
/// Field access instructions are decoded for length but deliberately not
/// reported; permission inference never keys off field access.
pub fn decode_code_refs(
    pool: &ConstantPool,
    code_attr_data: &[u8],
) -> Result<Vec<CodeRef>, ClassFileError> {
    let attr = parse_code_attribute(code_attr_data)?;
    let code = attr.code;
    let mut refs = Vec::new();
    let mut pc = 0usize;

    let operand = |at: usize| -> Result<u8, ClassFileError> {
        code.get(at).copied().ok_or_else(|| {
            ClassFileError::MalformedCode(format!("operand past end of code at pc {at}"))
        })
    };
    let operand_u16 = |at: usize| -> Result<u16, ClassFileError> {
        Ok(u16::from_be_bytes([operand(at)?, operand(at + 1)?]))
    };
    let operand_i32 = |at: usize| -> Result<i32, ClassFileError> {
        Ok(i32::from_be_bytes([
            operand(at)?,
            operand(at + 1)?,
            operand(at + 2)?,
            operand(at + 3)?,
        ]))
    };

    while pc < code.len() {
        let opcode = code[pc];
        match opcode {
            // ldc
            0x12 => {
                push_constant_ref(pool, operand(pc + 1)? as u16, &mut refs);
                pc += 2;
            }
            // ldc_w, ldc2_w
            0x13 | 0x14 => {
                if opcode == 0x13 {
                    push_constant_ref(pool, operand_u16(pc + 1)?, &mut refs);
                }
                pc += 3;
            }
            // getstatic, putstatic, getfield, putfield
            0xb2..=0xb5 => pc += 3,
            // invokevirtual, invokespecial, invokestatic
            0xb6..=0xb8 => {
                push_call_ref(pool, operand_u16(pc + 1)?, &mut refs);
                pc += 3;
            }
            // invokeinterface (two trailing count/zero bytes)
            0xb9 => {
                push_call_ref(pool, operand_u16(pc + 1)?, &mut refs);
                pc += 5;
            }
            // invokedynamic: no owner class to report
            0xba => pc += 5,
            // new, anewarray, checkcast, instanceof
            0xbb | 0xbd | 0xc0 | 0xc1 => {
                if let Some(name) = pool.class_name(operand_u16(pc + 1)?) {
                    refs.push(CodeRef::Type(name.into_owned()));
                }
                pc += 3;
            }
            // multianewarray (extra dimensions byte)
            0xc5 => {
                if let Some(name) = pool.class_name(operand_u16(pc + 1)?) {
                    refs.push(CodeRef::Type(name.into_owned()));
                }
                pc += 4;
            }
            // wide
            0xc4 => {
                let widened = operand(pc + 1)?;
                // wide iinc carries an extra 16-bit increment
                pc += if widened == 0x84 { 6 } else { 4 };
            }
            // tableswitch
            0xaa => {
                let base = pc + 1 + (4 - (pc + 1) % 4) % 4;
                let low = operand_i32(base + 4)?;
                let high = operand_i32(base + 8)?;
                if high < low {
                    return Err(ClassFileError::MalformedCode(format!(
                        "tableswitch range {low}..{high} at pc {pc}"
                    )));
                }
                pc = base + 12 + 4 * (high - low + 1) as usize;
            }
            // lookupswitch
            0xab => {
                let base = pc + 1 + (4 - (pc + 1) % 4) % 4;
                let npairs = operand_i32(base + 4)?;
                if npairs < 0 {
                    return Err(ClassFileError::MalformedCode(format!(
                        "negative lookupswitch pair count at pc {pc}"
                    )));
                }
                pc = base + 8 + 8 * npairs as usize;
            }
            // bipush, loads/stores with index byte, ret, newarray
            0x10 | 0x15..=0x19 | 0x36..=0x3a | 0xa9 | 0xbc => pc += 2,
            // sipush, iinc, branches, ifnull/ifnonnull
            0x11 | 0x84 | 0x99..=0xa8 | 0xc6 | 0xc7 => pc += 3,
            // goto_w, jsr_w
            0xc8 | 0xc9 => pc += 5,
            _ => pc += 1,
        }
    }

    // Local variable declared types, matching what a debugger would see.
    for &(name_index, data) in &attr.attributes {
        if pool.utf8(name_index).as_deref() != Some("LocalVariableTable") {
            continue;
        }
        let mut r = Reader::new(data);
        let count = r.u16()? as usize;
        for _ in 0..count {
            let _start = r.u16()?;
            let _len = r.u16()?;
            let _name = r.u16()?;
            let descriptor_index = r.u16()?;
            let _slot = r.u16()?;
            if let Some(desc) = pool.utf8(descriptor_index) {
                if let Some(inner) = desc.strip_prefix('L').and_then(|d| d.strip_suffix(';')) {
                    refs.push(CodeRef::LocalType(inner.to_string()));
                }
            }
        }
    }

    Ok(refs)
}

fn push_constant_ref(pool: &ConstantPool, index: u16, refs: &mut Vec<CodeRef>) {
    if let Some(Constant::Class { name_index }) = pool.entry(index) {
        if let Some(name) = pool.utf8(*name_index) {
            refs.push(CodeRef::ClassConstant(name.into_owned()));
        }
    }
}

fn push_call_ref(pool: &ConstantPool, index: u16, refs: &mut Vec<CodeRef>) {
    if let Some((owner, name)) = pool.member_ref(index) {
        refs.push(CodeRef::Call {
            owner: owner.into_owned(),
            name: name.into_owned(),
        });
    }
}
