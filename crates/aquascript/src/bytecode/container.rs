//! The bytecode container format (C4 in spec.md §4.4): a flat,
//! little-endian framed blob of `"AQUA"` magic, a u16 version, and a run
//! of u32-length-prefixed UTF-8 JSON sections.
//!
//! spec.md's literal section list is constants/globals/functions/main
//! instructions; this crate's compiled unit also carries a class table
//! (`Code::classes`, needed because `CREATE_CLASS` here reads class
//! metadata from the compiled unit rather than a constant-pool value —
//! see DESIGN.md), so a fifth section is inserted between the function
//! table and main instructions. spec.md explicitly says the JSON framing
//! itself is non-normative as long as round-trip equality of the logical
//! structure holds, which this still satisfies.

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::LoadError;

use super::code::Code;

const MAGIC: &[u8; 4] = b"AQUA";
const VERSION: u16 = 1;

/// Serializes a compiled unit into the framed container format.
#[must_use]
pub fn serialize(code: &Code) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    write_section(&mut out, &code.constants);
    write_section(&mut out, &code.globals);
    write_section(&mut out, &code.functions);
    write_section(&mut out, &code.classes);
    write_section(&mut out, &code.instructions);
    out
}

/// Deserializes a container blob back into a compiled unit, validating
/// the magic and version first.
pub fn deserialize(bytes: &[u8]) -> Result<Code, LoadError> {
    if bytes.len() < 6 || &bytes[0..4] != MAGIC {
        return Err(LoadError::new("bad magic: not an AquaScript bytecode file"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(LoadError::new(format!("unsupported bytecode version: {version}")));
    }

    let mut pos = 6usize;
    let constants = read_section(bytes, &mut pos)?;
    let globals = read_section(bytes, &mut pos)?;
    let functions = read_section(bytes, &mut pos)?;
    let classes = read_section(bytes, &mut pos)?;
    let instructions = read_section(bytes, &mut pos)?;

    Ok(Code { constants, globals, functions, classes, instructions })
}

fn write_section(out: &mut Vec<u8>, value: &impl Serialize) {
    let json = serde_json::to_vec(value).expect("compiled-unit sections always serialize");
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(&json);
}

fn read_section<T: DeserializeOwned>(bytes: &[u8], pos: &mut usize) -> Result<T, LoadError> {
    if *pos + 4 > bytes.len() {
        return Err(LoadError::new("truncated section length"));
    }
    let len = u32::from_le_bytes(bytes[*pos..*pos + 4].try_into().expect("4-byte slice")) as usize;
    *pos += 4;
    if *pos + len > bytes.len() {
        return Err(LoadError::new("truncated section body"));
    }
    let body = &bytes[*pos..*pos + len];
    *pos += len;
    serde_json::from_slice(body).map_err(|e| LoadError::new(format!("malformed section: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{ClassProto, Constant, FunctionProto, Instruction, Opcode};
    use indexmap::IndexMap;

    fn sample() -> Code {
        let mut functions = IndexMap::new();
        functions.insert(
            "fib".to_string(),
            FunctionProto {
                name: "fib".to_string(),
                params: vec!["n".to_string()],
                local_vars: IndexMap::from([("n".to_string(), 0)]),
                instructions: vec![Instruction::new(Opcode::LoadLocal, 0), Instruction::bare(Opcode::Return)],
            },
        );
        let mut classes = IndexMap::new();
        classes.insert(
            "Animal".to_string(),
            ClassProto { name: "Animal".to_string(), parent: None, methods: vec!["Animal.speak".to_string()] },
        );
        Code {
            constants: vec![Constant::Int(1), Constant::Str("hi".to_string())],
            globals: vec!["x".to_string()],
            functions,
            classes,
            instructions: vec![Instruction::bare(Opcode::Halt)],
        }
    }

    #[test]
    fn round_trips_through_bytes() {
        let code = sample();
        let bytes = serialize(&code);
        assert_eq!(&bytes[0..4], MAGIC);
        let restored = deserialize(&bytes).expect("valid container");
        assert_eq!(restored.constants, code.constants);
        assert_eq!(restored.globals, code.globals);
        assert_eq!(restored.instructions, code.instructions);
        assert!(restored.functions.contains_key("fib"));
        assert!(restored.classes.contains_key("Animal"));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = serialize(&sample());
        bytes[0] = b'X';
        assert!(deserialize(&bytes).is_err());
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = serialize(&sample());
        bytes[4..6].copy_from_slice(&99u16.to_le_bytes());
        assert!(deserialize(&bytes).is_err());
    }

    #[test]
    fn rejects_truncated_section() {
        let bytes = serialize(&sample());
        let truncated = &bytes[..bytes.len() - 4];
        assert!(deserialize(truncated).is_err());
    }
}
