// Progs image format
//
// In-memory model of a progs file and its little-endian serialization.
// Header section order follows the VM (strings before globals); the file
// itself stores the global data before the string blob.

use super::error::CompilerError;
use super::opcodes::Opcode;
use std::fmt;

pub const HEADER_SIZE: usize = 60;
pub const STATEMENT_SIZE: usize = 8;
pub const DEFINITION_SIZE: usize = 8;
pub const FUNCTION_SIZE: usize = 36;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Section {
    pub offset: i32,
    pub count: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub version: i32,
    pub crc: i32,
    pub statements: Section,
    pub global_defs: Section,
    pub field_defs: Section,
    pub functions: Section,
    /// Count is the blob size in bytes
    pub string_data: Section,
    /// Count is the number of 32-bit words
    pub global_data: Section,
    pub entity_fields: i32,
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "
Progs version:            {}
CRC:                      {}
Statements:               {:#08x} ({})
Global definitions:       {:#08x} ({})
Field definitions:        {:#08x} ({})
Functions:                {:#08x} ({})
String data:              {:#08x} ({} bytes)
Global data:              {:#08x} ({} words)
Entity fields:            {}
",
            self.version,
            self.crc,
            self.statements.offset,
            self.statements.count,
            self.global_defs.offset,
            self.global_defs.count,
            self.field_defs.offset,
            self.field_defs.count,
            self.functions.offset,
            self.functions.count,
            self.string_data.offset,
            self.string_data.count,
            self.global_data.offset,
            self.global_data.count,
            self.entity_fields,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statement {
    pub op: Opcode,
    pub a: i16,
    pub b: i16,
    pub c: i16,
}

impl Statement {
    pub fn new(op: Opcode, a: i16, b: i16, c: i16) -> Self {
        Statement { op, a, b, c }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<10} {} {} {}", self.op.name(), self.a, self.b, self.c)
    }
}

/// Global or field definition record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Definition {
    /// Type tag, see `emit::type_tag`
    pub ty: u16,
    pub offset: u16,
    /// Offset of the name in the string blob
    pub name: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionRecord {
    /// Negative for engine builtins (`-n` for builtin `#n`)
    pub first_statement: i32,
    pub first_local: i32,
    pub num_locals: i32,
    pub profile: i32,
    pub name: i32,
    pub file: i32,
    pub num_params: i32,
    pub param_sizes: [u8; 8],
}

/// NUL-terminated string blob, kept as the list of strings it contains
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable {
    entries: Vec<String>,
}

impl StringTable {
    pub fn new(entries: Vec<String>) -> Self {
        StringTable { entries }
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self, CompilerError> {
        let mut entries = Vec::new();
        let mut rest = blob;
        while !rest.is_empty() {
            let end = rest.iter().position(|&b| b == 0).ok_or_else(|| {
                CompilerError::ImageFormat("unterminated string in string data".to_string())
            })?;
            entries.push(String::from_utf8_lossy(&rest[..end]).into_owned());
            rest = &rest[end + 1..];
        }
        Ok(StringTable { entries })
    }

    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(self.size());
        for entry in &self.entries {
            blob.extend_from_slice(entry.as_bytes());
            blob.push(0);
        }
        blob
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn size(&self) -> usize {
        self.entries.iter().map(|s| s.len() + 1).sum()
    }

    /// String starting at `offset`, which may point into the middle of an entry
    pub fn get(&self, offset: i32) -> Option<&str> {
        let mut start = 0usize;
        let offset = usize::try_from(offset).ok()?;
        for entry in &self.entries {
            let end = start + entry.len();
            if offset <= end {
                return entry.get(offset - start..);
            }
            start = end + 1;
        }
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramData {
    pub header: Header,
    pub statements: Vec<Statement>,
    pub global_defs: Vec<Definition>,
    pub field_defs: Vec<Definition>,
    pub functions: Vec<FunctionRecord>,
    /// Raw words: float bit patterns or integer indices
    pub global_data: Vec<u32>,
    pub strings: StringTable,
}

impl ProgramData {
    /// Recompute every section from the current contents, in file order
    pub fn layout(&mut self) {
        let mut offset = HEADER_SIZE;
        let mut section = |count: usize, size: usize| {
            let placed = Section {
                offset: offset as i32,
                count: count as i32,
            };
            offset += count * size;
            placed
        };
        self.header.statements = section(self.statements.len(), STATEMENT_SIZE);
        self.header.global_defs = section(self.global_defs.len(), DEFINITION_SIZE);
        self.header.field_defs = section(self.field_defs.len(), DEFINITION_SIZE);
        self.header.functions = section(self.functions.len(), FUNCTION_SIZE);
        self.header.global_data = section(self.global_data.len(), 4);
        self.header.string_data = section(self.strings.size(), 1);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let header = &self.header;
        let total = header.string_data.offset as usize + header.string_data.count as usize;
        let mut out = Vec::with_capacity(total);

        put_i32(&mut out, header.version);
        put_i32(&mut out, header.crc);
        for section in [
            header.statements,
            header.global_defs,
            header.field_defs,
            header.functions,
            header.string_data,
            header.global_data,
        ] {
            put_i32(&mut out, section.offset);
            put_i32(&mut out, section.count);
        }
        put_i32(&mut out, header.entity_fields);

        for statement in &self.statements {
            out.extend_from_slice(&statement.op.raw_value().to_le_bytes());
            for operand in [statement.a, statement.b, statement.c] {
                out.extend_from_slice(&operand.to_le_bytes());
            }
        }
        for def in self.global_defs.iter().chain(&self.field_defs) {
            out.extend_from_slice(&def.ty.to_le_bytes());
            out.extend_from_slice(&def.offset.to_le_bytes());
            put_i32(&mut out, def.name);
        }
        for function in &self.functions {
            for value in [
                function.first_statement,
                function.first_local,
                function.num_locals,
                function.profile,
                function.name,
                function.file,
                function.num_params,
            ] {
                put_i32(&mut out, value);
            }
            out.extend_from_slice(&function.param_sizes);
        }
        for word in &self.global_data {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out.extend_from_slice(&self.strings.to_blob());
        out
    }

    pub fn read(bytes: &[u8]) -> Result<ProgramData, CompilerError> {
        let mut reader = ByteReader::new(bytes);
        let version = reader.i32()?;
        let crc = reader.i32()?;
        let mut sections = [Section::default(); 6];
        for section in sections.iter_mut() {
            section.offset = reader.i32()?;
            section.count = reader.i32()?;
        }
        let [statements, global_defs, field_defs, functions, string_data, global_data] = sections;
        let header = Header {
            version,
            crc,
            statements,
            global_defs,
            field_defs,
            functions,
            string_data,
            global_data,
            entity_fields: reader.i32()?,
        };

        let statements = reader.records(header.statements, |r| {
            let raw = r.u16()?;
            let op = Opcode::from_raw(raw)
                .ok_or_else(|| CompilerError::ImageFormat(format!("unknown opcode {}", raw)))?;
            Ok(Statement::new(op, r.i16()?, r.i16()?, r.i16()?))
        })?;
        let global_defs = reader.records(header.global_defs, read_definition)?;
        let field_defs = reader.records(header.field_defs, read_definition)?;
        let functions = reader.records(header.functions, |r| {
            let mut ints = [0i32; 7];
            for value in ints.iter_mut() {
                *value = r.i32()?;
            }
            let mut param_sizes = [0u8; 8];
            for size in param_sizes.iter_mut() {
                *size = r.u8()?;
            }
            let [first_statement, first_local, num_locals, profile, name, file, num_params] = ints;
            Ok(FunctionRecord {
                first_statement,
                first_local,
                num_locals,
                profile,
                name,
                file,
                num_params,
                param_sizes,
            })
        })?;
        let global_data = reader.records(header.global_data, |r| r.u32())?;
        reader.seek(header.string_data.offset)?;
        let blob = reader.take(header.string_data.count)?;
        let strings = StringTable::from_blob(blob)?;

        Ok(ProgramData {
            header,
            statements,
            global_defs,
            field_defs,
            functions,
            global_data,
            strings,
        })
    }
}

fn put_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn read_definition(r: &mut ByteReader<'_>) -> Result<Definition, CompilerError> {
    Ok(Definition {
        ty: r.u16()?,
        offset: r.u16()?,
        name: r.i32()?,
    })
}

/// Little-endian cursor over an image; every read is bounds-checked
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        ByteReader { bytes, pos: 0 }
    }

    fn seek(&mut self, offset: i32) -> Result<(), CompilerError> {
        let offset = usize::try_from(offset)
            .map_err(|_| CompilerError::ImageFormat(format!("negative offset {}", offset)))?;
        if offset > self.bytes.len() {
            return Err(CompilerError::ImageFormat(format!(
                "offset {:#x} past end of image ({} bytes)",
                offset,
                self.bytes.len()
            )));
        }
        self.pos = offset;
        Ok(())
    }

    fn take(&mut self, len: i32) -> Result<&'a [u8], CompilerError> {
        let len = usize::try_from(len)
            .map_err(|_| CompilerError::ImageFormat(format!("negative length {}", len)))?;
        let end = self.pos.checked_add(len).filter(|&end| end <= self.bytes.len());
        let Some(end) = end else {
            return Err(CompilerError::ImageFormat(format!(
                "truncated image: need {} bytes at {:#x}, have {}",
                len,
                self.pos,
                self.bytes.len()
            )));
        };
        let bytes = self.bytes;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CompilerError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N as i32)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CompilerError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, CompilerError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn i16(&mut self) -> Result<i16, CompilerError> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, CompilerError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, CompilerError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn records<T>(
        &mut self,
        section: Section,
        mut read: impl FnMut(&mut Self) -> Result<T, CompilerError>,
    ) -> Result<Vec<T>, CompilerError> {
        self.seek(section.offset)?;
        let count = usize::try_from(section.count).map_err(|_| {
            CompilerError::ImageFormat(format!("negative section count {}", section.count))
        })?;
        let mut records = Vec::with_capacity(count.min(self.bytes.len()));
        for _ in 0..count {
            records.push(read(self)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
#[path = "program_tests.rs"]
mod tests;
