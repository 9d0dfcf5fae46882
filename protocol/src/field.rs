//! Field encoding strategies for the binary wire form.
//!
//! Each strategy is declared once per schema field and drives both encode
//! and decode. Options that reference another field resolve against the
//! fields already processed, so declaration order is decode order.

use byteorder::{BigEndian, ReadBytesExt};

use crate::command::CommandScope;
use crate::error::ProtocolError;
use crate::packet::Packet;
use crate::value::{Row, Value};
use crate::FRAME_HEADER_LEN;

/// A length or count option: a literal, or the decoded value of an earlier
/// field in the same packet, resolved at encode/decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOpt {
    Lit(usize),
    Ref(&'static str),
}

impl FieldOpt {
    fn resolve(self, decoded: &[(String, Value)]) -> usize {
        match self {
            FieldOpt::Lit(n) => n,
            FieldOpt::Ref(name) => lookup(decoded, name).map(Value::as_int).unwrap_or(0) as usize,
        }
    }
}

/// One field-encoding strategy.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Big-endian unsigned integer of `width` bytes. Out-of-range values
    /// clamp to the width's maximum; the wire format does not represent
    /// overflow.
    Int { width: usize },
    /// High nibble of a byte shared with the following `Lsn` field. Emits
    /// and consumes nothing by itself.
    Msn,
    /// Low nibble of the shared byte; completes it on encode and consumes
    /// it on decode.
    Lsn,
    /// NUL-terminated UTF-8 string; embedded NULs are stripped on encode.
    Str,
    /// Consecutive NUL-terminated strings. With a count, short lists pad
    /// with empty strings and long lists truncate; without, decode splits
    /// on every NUL to the end of the payload.
    StrList { count: Option<FieldOpt> },
    /// `count` big-endian integers of `width` bytes each.
    IntList { width: usize, count: FieldOpt },
    /// As many records as the earlier `count_field` declared, each shaped
    /// by `schema`.
    Records {
        count_field: &'static str,
        schema: &'static [FieldDef],
    },
    /// Strategy selected by the decoded value of the earlier `on` field.
    /// An unmatched selector encodes nothing and decodes to `Absent`.
    Select {
        on: &'static str,
        arms: &'static [(u64, FieldKind)],
    },
    /// Nested sub-packet, carried as a complete frame so the outer packet
    /// fully determines the inner byte range.
    Packet,
}

/// A (strategy, name) pair within a packet schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldDef {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

fn lookup<'a>(decoded: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    decoded
        .iter()
        .find(|(field, _)| field == name)
        .map(|(_, value)| value)
}

fn clamp(value: u64, width: usize) -> u64 {
    if width >= 8 {
        return value;
    }
    let max = (1u64 << (8 * width)) - 1;
    value.min(max)
}

/// Binary payload writer with nibble-pairing state.
pub struct BinWriter {
    buf: Vec<u8>,
    msn: Option<u8>,
}

impl BinWriter {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            msn: None,
        }
    }

    /// Flushes a dangling high nibble (a schema that ends on an `Msn`) and
    /// returns the payload bytes.
    pub fn finish(mut self) -> Vec<u8> {
        if let Some(high) = self.msn.take() {
            self.buf.push(high << 4);
        }
        self.buf
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn int(&mut self, value: u64, width: usize) {
        let value = clamp(value, width);
        let be = value.to_be_bytes();
        self.buf.extend_from_slice(&be[8 - width.min(8)..]);
    }

    pub fn msn(&mut self, value: u64) {
        self.msn = Some(value.min(15) as u8);
    }

    pub fn lsn(&mut self, value: u64) {
        let high = self.msn.take().unwrap_or(0);
        self.buf.push((high << 4) | value.min(15) as u8);
    }

    pub fn str(&mut self, s: &str) {
        self.buf.extend(s.bytes().filter(|&b| b != 0));
        self.buf.push(0);
    }
}

impl Default for BinWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Binary payload reader. Truncation is the only failure; strings are read
/// leniently (a missing terminator takes the rest of the payload).
pub struct BinReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BinReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn int(&mut self, width: usize, field: &'static str) -> Result<u64, ProtocolError> {
        if self.remaining() < width {
            return Err(ProtocolError::Truncated { field });
        }
        let value = (&self.buf[self.pos..])
            .read_uint::<BigEndian>(width)
            .map_err(|_| ProtocolError::Truncated { field })?;
        self.pos += width;
        Ok(value)
    }

    /// Reads the high nibble without consuming the byte; the paired `Lsn`
    /// consumes it.
    pub fn msn(&mut self, field: &'static str) -> Result<u64, ProtocolError> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or(ProtocolError::Truncated { field })?;
        Ok((byte >> 4) as u64)
    }

    pub fn lsn(&mut self, field: &'static str) -> Result<u64, ProtocolError> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or(ProtocolError::Truncated { field })?;
        self.pos += 1;
        Ok((byte & 0x0F) as u64)
    }

    pub fn str(&mut self) -> String {
        let rest = &self.buf[self.pos..];
        match rest.iter().position(|&b| b == 0) {
            Some(nul) => {
                self.pos += nul + 1;
                String::from_utf8_lossy(&rest[..nul]).into_owned()
            }
            None => {
                self.pos = self.buf.len();
                String::from_utf8_lossy(rest).into_owned()
            }
        }
    }

    pub fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::Truncated { field });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

impl FieldKind {
    /// The value an absent field defaults to, used for padding and for the
    /// JSON projection.
    pub fn default_value(&self) -> Value {
        match self {
            FieldKind::Int { .. } | FieldKind::Msn | FieldKind::Lsn => Value::Int(0),
            FieldKind::Str => Value::Str(String::new()),
            FieldKind::StrList { .. } => Value::StrList(Vec::new()),
            FieldKind::IntList { .. } => Value::IntList(Vec::new()),
            FieldKind::Records { .. } => Value::Records(Vec::new()),
            FieldKind::Select { .. } | FieldKind::Packet => Value::Absent,
        }
    }

    /// The default resolved against the fields built so far. A `Select`
    /// whose selector matches an arm defaults to that arm's default, which
    /// is the value the binary decoder produces for it; `Absent` is kept
    /// only when no arm matches and the field never reaches the wire.
    pub fn resolved_default(&self, decoded: &[(String, Value)]) -> Value {
        match self {
            FieldKind::Select { on, arms } => {
                let selector = lookup(decoded, on).map(Value::as_int).unwrap_or(0);
                match arms.iter().find(|(key, _)| *key == selector) {
                    Some((_, kind)) => kind.resolved_default(decoded),
                    None => Value::Absent,
                }
            }
            other => other.default_value(),
        }
    }

    pub(crate) fn encode(&self, w: &mut BinWriter, value: &Value, decoded: &[(String, Value)]) {
        match self {
            FieldKind::Int { width } => w.int(value.as_int(), *width),
            FieldKind::Msn => w.msn(value.as_int()),
            FieldKind::Lsn => w.lsn(value.as_int()),
            FieldKind::Str => w.str(value.as_str()),
            FieldKind::StrList { count } => {
                let items = value.as_str_list();
                match count {
                    Some(opt) => {
                        let n = opt.resolve(decoded);
                        for i in 0..n {
                            w.str(items.get(i).map(String::as_str).unwrap_or(""));
                        }
                    }
                    None => {
                        for item in items {
                            w.str(item);
                        }
                    }
                }
            }
            FieldKind::IntList { width, count } => {
                let items = value.as_int_list();
                let n = count.resolve(decoded);
                for i in 0..n {
                    w.int(items.get(i).copied().unwrap_or(0), *width);
                }
            }
            FieldKind::Records {
                count_field,
                schema,
            } => {
                let no_rows: Vec<Row> = Vec::new();
                let rows = match value {
                    Value::Records(rows) => rows,
                    _ => &no_rows,
                };
                let empty_row: Row = Vec::new();
                let n = FieldOpt::Ref(count_field).resolve(decoded);
                for i in 0..n {
                    for def in *schema {
                        let field = rows
                            .get(i)
                            .and_then(|row| lookup(row, def.name).cloned())
                            .unwrap_or_else(|| def.kind.default_value());
                        // Records resolve references against their own row.
                        def.kind
                            .encode(w, &field, rows.get(i).unwrap_or(&empty_row));
                    }
                }
            }
            FieldKind::Select { on, arms } => {
                let selector = lookup(decoded, on).map(Value::as_int).unwrap_or(0);
                if let Some((_, kind)) = arms.iter().find(|(key, _)| *key == selector) {
                    let concrete = match value {
                        Value::Absent => kind.default_value(),
                        other => other.clone(),
                    };
                    kind.encode(w, &concrete, decoded);
                }
            }
            FieldKind::Packet => {
                if let Value::Packet(packet) = value {
                    w.raw(&packet.frame());
                }
            }
        }
    }

    pub(crate) fn decode(
        &self,
        r: &mut BinReader<'_>,
        name: &'static str,
        decoded: &[(String, Value)],
        nested: CommandScope,
    ) -> Result<Value, ProtocolError> {
        Ok(match self {
            FieldKind::Int { width } => Value::Int(r.int(*width, name)?),
            FieldKind::Msn => Value::Int(r.msn(name)?),
            FieldKind::Lsn => Value::Int(r.lsn(name)?),
            FieldKind::Str => Value::Str(r.str()),
            FieldKind::StrList { count } => {
                let items = match count {
                    Some(opt) => {
                        let n = opt.resolve(decoded);
                        (0..n).map(|_| r.str()).collect()
                    }
                    None => {
                        let mut items = Vec::new();
                        while !r.is_empty() {
                            items.push(r.str());
                        }
                        items
                    }
                };
                Value::StrList(items)
            }
            FieldKind::IntList { width, count } => {
                let n = count.resolve(decoded);
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(r.int(*width, name)?);
                }
                Value::IntList(items)
            }
            FieldKind::Records {
                count_field,
                schema,
            } => {
                let n = FieldOpt::Ref(count_field).resolve(decoded);
                let mut rows = Vec::with_capacity(n);
                for _ in 0..n {
                    let mut row: Row = Vec::with_capacity(schema.len());
                    for def in *schema {
                        let value = def.kind.decode(r, def.name, &row, nested)?;
                        row.push((def.name.to_string(), value));
                    }
                    rows.push(row);
                }
                Value::Records(rows)
            }
            FieldKind::Select { on, arms } => {
                let selector = lookup(decoded, on).map(Value::as_int).unwrap_or(0);
                match arms.iter().find(|(key, _)| *key == selector) {
                    Some((_, kind)) => kind.decode(r, name, decoded, nested)?,
                    None => Value::Absent,
                }
            }
            FieldKind::Packet => {
                let declared = r.int(FRAME_HEADER_LEN, name)? as usize;
                let frame = r.take(declared, name)?;
                match Packet::parse(nested, frame)? {
                    Some(packet) => Value::Packet(Box::new(packet)),
                    // Unknown inner commands are tolerated, same as outer.
                    None => Value::Absent,
                }
            }
        })
    }
}
