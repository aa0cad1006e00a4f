// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Field descriptors, and the pure decode and encode operations on them.

use crate::codes::CodeTable;
use crate::date::DATE_CODE_SIZE;
use crate::utils::bit_mask;
use crate::utils::extract_bits;
use crate::utils::insert_bits;
use crate::utils::word_from_bytes;
use crate::utils::word_to_bytes;
use crate::DateCode;
use crate::Error;
use crate::Record;
use crate::Value;
use xcvr_messages::cdb::CommandResult;
use xcvr_messages::cdb::StatusRegister;
use xcvr_messages::cdb::SUCCESS_CODE;
use xcvr_messages::mgmt::Address;
use xcvr_messages::mgmt::MemoryRegion;

/// The byte order of a multi-byte number.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(test, derive(strum::EnumIter))]
#[cfg_attr(
    feature = "api-traits",
    derive(serde::Serialize, schemars::JsonSchema)
)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// The encoding of an integer register.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "api-traits",
    derive(serde::Serialize, schemars::JsonSchema)
)]
pub struct NumberFormat {
    pub signed: bool,
    pub endian: Endian,
    /// Width in bytes, one of 1, 2, 4 or 8.
    pub width: usize,
}

impl NumberFormat {
    pub const U8: Self = Self::unsigned(1);
    pub const I8: Self = Self::signed(1);
    pub const U16: Self = Self::unsigned(2);
    pub const I16: Self = Self::signed(2);
    pub const U32: Self = Self::unsigned(4);
    pub const I32: Self = Self::signed(4);
    pub const U64: Self = Self::unsigned(8);

    /// A big-endian unsigned integer.
    pub const fn unsigned(width: usize) -> Self {
        Self {
            signed: false,
            endian: Endian::Big,
            width,
        }
    }

    /// A big-endian two's complement integer.
    pub const fn signed(width: usize) -> Self {
        Self {
            signed: true,
            endian: Endian::Big,
            width,
        }
    }

    pub const fn little_endian(self) -> Self {
        Self {
            endian: Endian::Little,
            ..self
        }
    }

    const fn is_valid(&self) -> bool {
        matches!(self.width, 1 | 2 | 4 | 8)
    }

    /// The inclusive range of raw values representable in this format.
    fn range(&self) -> (i128, i128) {
        let bits = self.width as u32 * 8;
        if self.signed {
            (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
        } else {
            (0, (1i128 << bits) - 1)
        }
    }

    fn decode(&self, buf: &[u8]) -> i128 {
        let word = word_from_bytes(buf, self.endian == Endian::Big);
        if self.signed {
            let shift = 64 - self.width as u32 * 8;
            i128::from(((word << shift) as i64) >> shift)
        } else {
            i128::from(word)
        }
    }

    /// Encode a raw value, which must already be in range.
    fn encode(&self, raw: i128) -> Vec<u8> {
        // Truncation to the low bytes yields the two's complement encoding.
        let word = raw as u64;
        word_to_bytes(word, self.width, self.endian == Endian::Big)
    }
}

/// A contiguous range of bits in a register word.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "api-traits",
    derive(serde::Serialize, schemars::JsonSchema)
)]
pub struct BitRange {
    pub pos: u8,
    pub width: u8,
}

/// A named range of bits within a register, decoded as its own value.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "api-traits",
    derive(serde::Serialize, schemars::JsonSchema)
)]
pub struct BitField {
    name: String,
    bits: BitRange,
}

impl BitField {
    pub fn new(name: impl Into<String>, pos: u8, width: u8) -> Self {
        Self {
            name: name.into(),
            bits: BitRange { pos, width },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bits(&self) -> BitRange {
        self.bits
    }
}

/// How the bytes of a register are interpreted.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    /// An integer, optionally divided by a scale factor when decoded.
    Number {
        format: NumberFormat,
        scale: Option<f64>,
    },
    /// A single bit.
    Flag,
    /// Fixed-width ASCII text, padded with spaces.
    Text,
    /// Opaque bytes.
    Hex,
    /// An SFF-8636 / CMIS date code.
    Date,
    /// An integer named by a code table.
    Code(&'static CodeTable),
    /// The result of the last CDB command, derived from the busy, failed and
    /// status code values of the status register.
    CommandResult { success_code: u8 },
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Number { scale: Some(_), .. } => "scaled number",
            FieldKind::Number { .. } => "number",
            FieldKind::Flag => "flag",
            FieldKind::Text => "text",
            FieldKind::Hex => "hex",
            FieldKind::Date => "date",
            FieldKind::Code(_) => "code",
            FieldKind::CommandResult { .. } => "command result",
        }
    }
}

/// A field backed by bytes at a fixed address in the register space.
#[derive(Clone, Debug, PartialEq)]
pub struct RegisterField {
    name: String,
    address: Address,
    width: usize,
    kind: FieldKind,
    read_only: bool,
    bits: Option<BitRange>,
    subfields: Vec<BitField>,
    deps: Vec<String>,
}

impl RegisterField {
    /// Construct a read-only field of any kind.
    pub fn new(name: impl Into<String>, address: Address, width: usize, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            address,
            width,
            kind,
            read_only: true,
            bits: None,
            subfields: Vec::new(),
            deps: Vec::new(),
        }
    }

    pub fn number(name: impl Into<String>, address: Address, format: NumberFormat) -> Self {
        Self::new(
            name,
            address,
            format.width,
            FieldKind::Number {
                format,
                scale: None,
            },
        )
    }

    /// A number decoded as `raw / scale`.
    pub fn scaled(
        name: impl Into<String>,
        address: Address,
        format: NumberFormat,
        scale: f64,
    ) -> Self {
        Self::new(
            name,
            address,
            format.width,
            FieldKind::Number {
                format,
                scale: Some(scale),
            },
        )
    }

    pub fn flag(name: impl Into<String>, address: Address, bit: u8) -> Self {
        Self::new(name, address, 1, FieldKind::Flag).bits(bit, 1)
    }

    pub fn text(name: impl Into<String>, address: Address, width: usize) -> Self {
        Self::new(name, address, width, FieldKind::Text)
    }

    pub fn hex(name: impl Into<String>, address: Address, width: usize) -> Self {
        Self::new(name, address, width, FieldKind::Hex)
    }

    pub fn date(name: impl Into<String>, address: Address) -> Self {
        Self::new(name, address, DATE_CODE_SIZE, FieldKind::Date)
    }

    pub fn code(name: impl Into<String>, address: Address, table: &'static CodeTable) -> Self {
        Self::new(name, address, 1, FieldKind::Code(table))
    }

    /// The result of the last CDB command.
    ///
    /// `deps` names the busy flag, the failed flag and the status code, in
    /// that order.
    pub fn command_result(name: impl Into<String>, address: Address, deps: [&str; 3]) -> Self {
        let mut field = Self::new(
            name,
            address,
            1,
            FieldKind::CommandResult {
                success_code: SUCCESS_CODE,
            },
        );
        field.deps = deps.iter().map(|d| d.to_string()).collect();
        field
    }

    /// Override the status code which denotes success.
    pub fn success_code(mut self, code: u8) -> Self {
        if let FieldKind::CommandResult { success_code } = &mut self.kind {
            *success_code = code;
        }
        self
    }

    pub fn writable(mut self) -> Self {
        self.read_only = false;
        self
    }

    /// Restrict the field's value to a range of bits of the register.
    pub fn bits(mut self, pos: u8, width: u8) -> Self {
        self.bits = Some(BitRange { pos, width });
        self
    }

    pub fn subfield(mut self, name: impl Into<String>, pos: u8, width: u8) -> Self {
        self.subfields.push(BitField::new(name, pos, width));
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.deps.push(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn bit_range(&self) -> Option<BitRange> {
        self.bits
    }

    pub fn subfields(&self) -> &[BitField] {
        &self.subfields
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidDescriptor {
            field: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn big_endian(&self) -> bool {
        match &self.kind {
            FieldKind::Number { format, .. } => format.endian == Endian::Big,
            _ => true,
        }
    }

    fn check_bits(&self, bits: BitRange) -> Result<(), Error> {
        if self.width > 8 {
            return Err(self.invalid("bit ranges require a register of at most 8 bytes"));
        }
        if bits.width == 0 || usize::from(bits.pos) + usize::from(bits.width) > self.width * 8 {
            return Err(self.invalid(format!(
                "bits {}..{} exceed a {}-byte register",
                bits.pos,
                u32::from(bits.pos) + u32::from(bits.width),
                self.width
            )));
        }
        Ok(())
    }

    /// Check the internal consistency of the descriptor.
    pub fn validate(&self) -> Result<(), Error> {
        if self.width == 0 {
            return Err(self.invalid("zero width"));
        }
        // Fields may never span a page boundary.
        MemoryRegion::new(self.address, self.width)?;

        match &self.kind {
            FieldKind::Number { format, scale } => {
                if !format.is_valid() || format.width != self.width {
                    return Err(self.invalid(format!("unsupported number width {}", format.width)));
                }
                if let Some(scale) = scale {
                    if self.width == 8 {
                        return Err(self.invalid("scale is not supported on 8-byte numbers"));
                    }
                    if !scale.is_finite() || *scale == 0.0 {
                        return Err(self.invalid(format!("invalid scale {scale}")));
                    }
                }
            }
            FieldKind::Flag => match self.bits {
                Some(BitRange { width: 1, .. }) => {}
                _ => return Err(self.invalid("flags must cover exactly one bit")),
            },
            FieldKind::Text | FieldKind::Hex => {
                if self.bits.is_some() {
                    return Err(self.invalid("byte fields cannot have a bit range"));
                }
            }
            FieldKind::Date => {
                if self.width != DATE_CODE_SIZE || self.bits.is_some() {
                    return Err(self.invalid("date codes are exactly 8 bytes"));
                }
            }
            FieldKind::Code(_) => {
                if self.width > 8 {
                    return Err(self.invalid("codes are at most 8 bytes"));
                }
            }
            FieldKind::CommandResult { .. } => {
                if self.deps.len() != 3 {
                    return Err(self.invalid("command results depend on busy, failed and status"));
                }
                if !self.read_only {
                    return Err(self.invalid("command results are derived and read-only"));
                }
            }
        }

        if let Some(bits) = self.bits {
            self.check_bits(bits)?;
        }

        let mut used = 0u64;
        for bf in &self.subfields {
            self.check_bits(bf.bits)?;
            let mask = bit_mask(bf.bits.pos, bf.bits.width)?;
            if used & mask != 0 {
                return Err(self.invalid(format!("subfield '{}' overlaps another", bf.name)));
            }
            used |= mask;
        }
        Ok(())
    }

    // Descriptors built by hand may skip `validate()`.
    fn check_format(&self, format: &NumberFormat) -> Result<(), Error> {
        if !format.is_valid() || format.width > self.width {
            return Err(self.invalid(format!("unsupported number width {}", format.width)));
        }
        Ok(())
    }

    fn check_len(&self, raw: &[u8]) -> Result<(), Error> {
        if raw.len() < self.width {
            return Err(Error::ShortRead {
                field: self.name.clone(),
                expected: self.width,
                actual: raw.len(),
            });
        }
        Ok(())
    }

    fn word(&self, raw: &[u8]) -> u64 {
        word_from_bytes(&raw[..self.width.min(8)], self.big_endian())
    }

    /// The raw unsigned value of the field, after applying the bit range.
    fn unsigned(&self, raw: &[u8]) -> Result<u64, Error> {
        let word = self.word(raw);
        match self.bits {
            Some(bits) => extract_bits(word, bits.pos, bits.width),
            None => Ok(word),
        }
    }

    fn mismatch(&self, value: &Value) -> Error {
        Error::ValueMismatch {
            field: self.name.clone(),
            expected: self.kind.name(),
            found: value.to_string(),
        }
    }

    fn out_of_range(&self, value: impl ToString) -> Error {
        Error::ValueOutOfRange {
            field: self.name.clone(),
            value: value.to_string(),
        }
    }

    /// Look up this field's dependencies, first in `local` then in
    /// `external`.
    pub fn collect_deps(&self, local: &Record, external: &Record) -> Result<Record, Error> {
        let mut deps = Record::new();
        for dep in &self.deps {
            let value = local
                .get(dep)
                .or_else(|| external.get(dep))
                .ok_or_else(|| Error::MissingDependency {
                    field: self.name.clone(),
                    dependency: dep.clone(),
                })?;
            deps.insert(dep.as_str(), value.clone());
        }
        Ok(deps)
    }

    fn dep<'r>(&self, deps: &'r Record, index: usize) -> Result<&'r Value, Error> {
        let name = self.deps.get(index).ok_or_else(|| self.invalid("missing dependency"))?;
        deps.get(name).ok_or_else(|| Error::MissingDependency {
            field: self.name.clone(),
            dependency: name.clone(),
        })
    }

    /// Decode the field from its raw bytes.
    ///
    /// `deps` must contain the decoded values of every field named in
    /// [`RegisterField::deps`].
    pub fn decode(&self, raw: &[u8], deps: &Record) -> Result<Value, Error> {
        self.check_len(raw)?;
        let raw = &raw[..self.width];
        match &self.kind {
            FieldKind::Number { format, scale } => {
                self.check_format(format)?;
                let x = match self.bits {
                    Some(_) => i128::from(self.unsigned(raw)?),
                    None => format.decode(raw),
                };
                match scale {
                    Some(scale) => Ok(Value::Float(x as f64 / scale)),
                    None if x < 0 => Ok(Value::Signed(x as i64)),
                    None if format.signed && self.bits.is_none() => Ok(Value::Signed(x as i64)),
                    None => Ok(Value::Unsigned(x as u64)),
                }
            }
            FieldKind::Flag => Ok(Value::Bool(self.unsigned(raw)? != 0)),
            FieldKind::Text => {
                // Malformed text is truncated to its valid prefix.
                let text = match std::str::from_utf8(raw) {
                    Ok(text) => text,
                    Err(e) => std::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or_default(),
                };
                Ok(Value::Text(text.trim_end_matches([' ', '\0']).to_string()))
            }
            FieldKind::Hex => Ok(Value::Hex(raw.to_vec())),
            // Blank or malformed date codes are common, and are kept as raw
            // bytes.
            FieldKind::Date => Ok(DateCode::parse(raw)
                .map(Value::Date)
                .unwrap_or_else(|_| Value::Hex(raw.to_vec()))),
            FieldKind::Code(table) => {
                let raw = self.unsigned(raw)?;
                Ok(match table.lookup(raw) {
                    Some(label) => Value::Code { raw, label },
                    None => Value::UnknownCode(raw),
                })
            }
            FieldKind::CommandResult { success_code } => {
                let busy = self.dep(deps, 0)?;
                let failed = self.dep(deps, 1)?;
                let code = self.dep(deps, 2)?;
                let status = StatusRegister {
                    busy: busy.as_bool().ok_or_else(|| self.mismatch(busy))?,
                    failed: failed.as_bool().ok_or_else(|| self.mismatch(failed))?,
                    code: code
                        .as_u64()
                        .and_then(|c| u8::try_from(c).ok())
                        .ok_or_else(|| self.mismatch(code))?,
                };
                Ok(Value::CommandResult(CommandResult::classify(
                    status,
                    *success_code,
                )))
            }
        }
    }

    /// Decode one of this field's subfields from the field's raw bytes.
    pub fn decode_subfield(&self, raw: &[u8], subfield: &BitField) -> Result<Value, Error> {
        self.check_len(raw)?;
        let x = extract_bits(self.word(raw), subfield.bits.pos, subfield.bits.width)?;
        if subfield.bits.width == 1 {
            Ok(Value::Bool(x != 0))
        } else {
            Ok(Value::Unsigned(x))
        }
    }

    /// Decode the field and its subfields, in order.
    pub fn decode_entries(&self, raw: &[u8], deps: &Record) -> Result<Vec<(String, Value)>, Error> {
        let mut out = vec![(self.name.clone(), self.decode(raw, deps)?)];
        for bf in &self.subfields {
            out.push((bf.name.clone(), self.decode_subfield(raw, bf)?));
        }
        Ok(out)
    }

    /// Encode a value into the field's raw bytes.
    ///
    /// For fields with a bit range, the returned bytes hold the value shifted
    /// into place with all other bits clear. Use [`RegisterField::merge`] to
    /// combine them with the register's current contents.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, Error> {
        if self.read_only {
            return Err(Error::ReadOnlyViolation(self.name.clone()));
        }
        match &self.kind {
            FieldKind::Number { format, scale } => {
                self.check_format(format)?;
                let x = match (scale, value) {
                    (Some(scale), v) => {
                        let f = v.as_f64().ok_or_else(|| self.mismatch(v))? * scale;
                        if !f.is_finite() {
                            return Err(self.out_of_range(value));
                        }
                        f.round() as i128
                    }
                    (None, Value::Unsigned(x)) => i128::from(*x),
                    (None, Value::Signed(x)) => i128::from(*x),
                    (None, Value::Float(f)) if f.fract() == 0.0 => *f as i128,
                    (None, v) => return Err(self.mismatch(v)),
                };
                match self.bits {
                    Some(bits) => self.encode_bits(x, bits, value),
                    None => {
                        let (min, max) = format.range();
                        if x < min || x > max {
                            return Err(self.out_of_range(value));
                        }
                        Ok(format.encode(x))
                    }
                }
            }
            FieldKind::Flag => {
                let b = value.as_bool().ok_or_else(|| self.mismatch(value))?;
                let bits = self.bits.ok_or_else(|| self.invalid("flag without a bit"))?;
                self.encode_bits(i128::from(b), bits, value)
            }
            FieldKind::Text => {
                let Value::Text(s) = value else {
                    return Err(self.mismatch(value));
                };
                if !s.is_ascii() || s.len() > self.width {
                    return Err(self.out_of_range(value));
                }
                let mut out = vec![b' '; self.width];
                out[..s.len()].copy_from_slice(s.as_bytes());
                Ok(out)
            }
            FieldKind::Hex => {
                let Value::Hex(bytes) = value else {
                    return Err(self.mismatch(value));
                };
                if bytes.len() != self.width {
                    return Err(self.out_of_range(value));
                }
                Ok(bytes.clone())
            }
            FieldKind::Date => {
                let Value::Date(date) = value else {
                    return Err(self.mismatch(value));
                };
                Ok(date.to_bytes()?.to_vec())
            }
            FieldKind::Code(table) => {
                let raw = match value {
                    Value::Code { raw, .. } | Value::UnknownCode(raw) | Value::Unsigned(raw) => {
                        *raw
                    }
                    Value::Text(label) => table
                        .raw_for(label)
                        .ok_or_else(|| self.out_of_range(value))?,
                    v => return Err(self.mismatch(v)),
                };
                match self.bits {
                    Some(bits) => self.encode_bits(i128::from(raw), bits, value),
                    None => {
                        if self.width < 8 && raw >> (self.width * 8) != 0 {
                            return Err(self.out_of_range(value));
                        }
                        Ok(word_to_bytes(raw, self.width, true))
                    }
                }
            }
            FieldKind::CommandResult { .. } => Err(Error::ReadOnlyViolation(self.name.clone())),
        }
    }

    fn encode_bits(&self, x: i128, bits: BitRange, value: &Value) -> Result<Vec<u8>, Error> {
        let x = u64::try_from(x).map_err(|_| self.out_of_range(value))?;
        let word = insert_bits(x, bits.pos, bits.width).map_err(|_| self.out_of_range(value))?;
        Ok(word_to_bytes(word, self.width, self.big_endian()))
    }

    /// The bytes of the register occupied by this field's bit range, if it
    /// has one.
    pub fn mask(&self) -> Option<Vec<u8>> {
        let bits = self.bits?;
        let mask = bit_mask(bits.pos, bits.width).ok()?;
        Some(word_to_bytes(mask, self.width, self.big_endian()))
    }

    /// Replace one subfield within the current contents of the register.
    ///
    /// One-bit subfields take a boolean, wider ones an unsigned integer.
    pub fn merge_subfield(
        &self,
        current: &[u8],
        subfield: &BitField,
        value: &Value,
    ) -> Result<Vec<u8>, Error> {
        if self.read_only {
            return Err(Error::ReadOnlyViolation(subfield.name.clone()));
        }
        self.check_len(current)?;
        let x = match value {
            Value::Bool(b) if subfield.bits.width == 1 => u64::from(*b),
            Value::Unsigned(x) => *x,
            v => {
                return Err(Error::ValueMismatch {
                    field: subfield.name.clone(),
                    expected: "unsigned integer",
                    found: v.to_string(),
                })
            }
        };
        let BitRange { pos, width } = subfield.bits;
        let bits = insert_bits(x, pos, width).map_err(|_| Error::ValueOutOfRange {
            field: subfield.name.clone(),
            value: value.to_string(),
        })?;
        let word = (self.word(current) & !bit_mask(pos, width)?) | bits;
        Ok(word_to_bytes(word, self.width, self.big_endian()))
    }

    /// Merge encoded bytes into the current contents of the register.
    ///
    /// Bits outside the field's bit range keep their current values.
    pub fn merge(&self, current: &[u8], encoded: &[u8]) -> Vec<u8> {
        match self.mask() {
            Some(mask) => current
                .iter()
                .zip(encoded)
                .zip(mask)
                .map(|((old, new), m)| (old & !m) | (new & m))
                .collect(),
            None => encoded.to_vec(),
        }
    }
}

/// A named, ordered collection of fields, with no address of its own.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupField {
    name: String,
    children: Vec<Field>,
}

impl GroupField {
    pub fn new(name: impl Into<String>, children: impl IntoIterator<Item = Field>) -> Self {
        Self {
            name: name.into(),
            children: children.into_iter().collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[Field] {
        &self.children
    }

    /// Every register field in the group, depth-first.
    pub fn registers(&self) -> Vec<&RegisterField> {
        let mut out = Vec::new();
        for child in &self.children {
            match child {
                Field::Register(reg) => out.push(reg),
                Field::Group(group) => out.extend(group.registers()),
            }
        }
        out
    }

    /// Return true if a field or subfield of this name is decoded as part of
    /// this group, at any depth.
    pub fn contains(&self, name: &str) -> bool {
        self.children.iter().any(|child| match child {
            Field::Register(reg) => {
                reg.name() == name || reg.subfields().iter().any(|bf| bf.name() == name)
            }
            Field::Group(group) => group.name() == name || group.contains(name),
        })
    }

    /// Decode the group, fetching each register's raw bytes from `raw`.
    ///
    /// Dependencies are resolved against the fields decoded so far, and then
    /// against `external`.
    pub fn decode_with<'a, F>(&self, raw: &mut F, external: &Record) -> Result<Record, Error>
    where
        F: FnMut(&RegisterField) -> Result<&'a [u8], Error>,
    {
        let mut record = Record::new();
        for child in &self.children {
            match child {
                Field::Register(reg) => {
                    let bytes = raw(reg)?;
                    let deps = reg.collect_deps(&record, external)?;
                    for (name, value) in reg.decode_entries(bytes, &deps)? {
                        record.insert(name, value);
                    }
                }
                Field::Group(group) => {
                    let inner = group.decode_with(raw, external)?;
                    record.insert(group.name(), Value::Record(inner));
                }
            }
        }
        Ok(record)
    }
}

/// A node in a memory map.
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Register(RegisterField),
    Group(GroupField),
}

impl Field {
    pub fn name(&self) -> &str {
        match self {
            Field::Register(reg) => reg.name(),
            Field::Group(group) => group.name(),
        }
    }
}

impl From<RegisterField> for Field {
    fn from(reg: RegisterField) -> Self {
        Field::Register(reg)
    }
}

impl From<GroupField> for Field {
    fn from(group: GroupField) -> Self {
        Field::Group(group)
    }
}
