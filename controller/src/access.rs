// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Read and write named fields of a module's memory map.

use crate::Bus;
use crate::DecodeError;
use crate::Error;
use slog::trace;
use slog::Logger;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use xcvr_decode::FieldRef;
use xcvr_decode::GroupField;
use xcvr_decode::MemoryMap;
use xcvr_decode::Record;
use xcvr_decode::RegisterField;
use xcvr_decode::Value;
use xcvr_messages::mgmt::split_access;
use xcvr_messages::mgmt::Address;

// Raw register contents, keyed by address and width.
type Snapshot = BTreeMap<(Address, usize), Vec<u8>>;

/// Field-level access to a module.
///
/// Reads fetch exactly the bytes a field covers and decode them through the
/// memory map. Writes of fields narrower than their register are done as a
/// read-modify-write, leaving the other bits untouched. Large writes are
/// split into pieces of at most `max_write_size` bytes.
#[derive(Debug)]
pub struct RegisterAccess<'a, B> {
    bus: B,
    map: &'a MemoryMap,
    max_write_size: u8,
    log: Logger,
}

impl<'a, B: Bus> RegisterAccess<'a, B> {
    pub fn new(bus: B, map: &'a MemoryMap, max_write_size: u8, log: &Logger) -> Self {
        Self {
            bus,
            map,
            max_write_size,
            log: log.new(slog::o!("component" => "register-access")),
        }
    }

    pub fn map(&self) -> &'a MemoryMap {
        self.map
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_inner(self) -> B {
        self.bus
    }

    /// Read raw bytes from the module.
    pub async fn read_bytes(&mut self, address: Address, len: usize) -> Result<Vec<u8>, Error> {
        trace!(self.log, "read"; "address" => %address, "len" => len);
        Ok(self.bus.read(address, len).await?)
    }

    /// Write raw bytes to the module, splitting the write as needed.
    ///
    /// The bytes must lie within a single page.
    pub async fn write_bytes(&mut self, address: Address, data: &[u8]) -> Result<(), Error> {
        let mut start = 0;
        for region in split_access(address, data.len(), self.max_write_size)? {
            let chunk = &data[start..start + region.len()];
            trace!(
                self.log,
                "write";
                "address" => %region.address(),
                "len" => region.len(),
            );
            self.bus.write(region.address(), chunk).await?;
            start += region.len();
        }
        Ok(())
    }

    async fn read_register(&mut self, field: &RegisterField) -> Result<Vec<u8>, Error> {
        self.read_bytes(field.address(), field.width()).await
    }

    // Read a register unless it's already in the snapshot.
    async fn snapshot(
        &mut self,
        field: &RegisterField,
        snapshot: &mut Snapshot,
    ) -> Result<Vec<u8>, Error> {
        let key = (field.address(), field.width());
        if let Some(raw) = snapshot.get(&key) {
            return Ok(raw.clone());
        }
        let raw = self.read_register(field).await?;
        snapshot.insert(key, raw.clone());
        Ok(raw)
    }

    /// Read and decode a single register field.
    ///
    /// Each register is read at most once, so a field and its dependencies
    /// in the same register see the same contents.
    pub async fn read(&mut self, field: &RegisterField) -> Result<Value, Error> {
        let mut snapshot = Snapshot::new();
        let known = self
            .resolve(field.deps(), Record::new(), &mut snapshot)
            .await?;
        let deps = field.collect_deps(&known, &Record::new())?;
        let raw = self.snapshot(field, &mut snapshot).await?;
        Ok(field.decode(&raw, &deps)?)
    }

    /// Read and decode every field of a group.
    ///
    /// The registers of the group are all read before anything is decoded,
    /// so a failed access fails the whole group.
    pub async fn read_group(&mut self, group: &GroupField) -> Result<Record, Error> {
        let registers = group.registers();
        let mut snapshot = Snapshot::new();

        // Dependencies outside the group are read first.
        let external: Vec<String> = registers
            .iter()
            .flat_map(|reg| reg.deps())
            .filter(|dep| !group.contains(dep))
            .cloned()
            .collect();
        let external = self
            .resolve(&external, Record::new(), &mut snapshot)
            .await?;

        for reg in registers {
            self.snapshot(reg, &mut snapshot).await?;
        }
        let mut lookup = |reg: &RegisterField| {
            snapshot
                .get(&(reg.address(), reg.width()))
                .map(Vec::as_slice)
                .ok_or_else(|| DecodeError::UnknownField(reg.name().to_string()))
        };
        Ok(group.decode_with(&mut lookup, &external)?)
    }

    /// Read anything in the memory map.
    pub async fn read_ref(&mut self, field: FieldRef<'_>) -> Result<Value, Error> {
        match field {
            FieldRef::Register(reg) => self.read(reg).await,
            FieldRef::Group(group) => self.read_group(group).await.map(Value::Record),
            FieldRef::Bits { parent, bitfield } => {
                let raw = self.read_register(parent).await?;
                Ok(parent.decode_subfield(&raw, bitfield)?)
            }
        }
    }

    /// Read a field, group or subfield by name.
    pub async fn read_by_name(&mut self, name: &str) -> Result<Value, Error> {
        let map = self.map;
        self.read_ref(map.lookup(name)?).await
    }

    /// Encode and write a register field.
    ///
    /// Read-only fields are rejected without touching the module.
    pub async fn write(&mut self, field: &RegisterField, value: &Value) -> Result<(), Error> {
        if field.is_read_only() {
            return Err(DecodeError::ReadOnlyViolation(field.name().to_string()).into());
        }
        let encoded = field.encode(value)?;
        let bytes = match field.mask() {
            Some(_) => {
                let current = self.read_register(field).await?;
                field.merge(&current, &encoded)
            }
            None => encoded,
        };
        self.write_bytes(field.address(), &bytes).await
    }

    /// Write a field or subfield by name.
    pub async fn write_by_name(&mut self, name: &str, value: &Value) -> Result<(), Error> {
        let map = self.map;
        match map.lookup(name)? {
            FieldRef::Register(reg) => self.write(reg, value).await,
            FieldRef::Bits { parent, bitfield } => {
                if parent.is_read_only() {
                    return Err(DecodeError::ReadOnlyViolation(name.to_string()).into());
                }
                let current = self.read_register(parent).await?;
                let bytes = parent.merge_subfield(&current, bitfield, value)?;
                self.write_bytes(parent.address(), &bytes).await
            }
            FieldRef::Group(group) => {
                Err(DecodeError::ReadOnlyViolation(group.name().to_string()).into())
            }
        }
    }

    // Decode the named fields, and everything they depend on, in dependency
    // order. Names already in `known` are not read again.
    async fn resolve(
        &mut self,
        names: &[String],
        mut known: Record,
        snapshot: &mut Snapshot,
    ) -> Result<Record, Error> {
        let map = self.map;
        let mut pending: Vec<String> = names.to_vec();
        let mut expanded = BTreeSet::new();
        while let Some(name) = pending.last().cloned() {
            if known.contains(&name) {
                pending.pop();
                continue;
            }
            match map.lookup(&name)? {
                FieldRef::Bits { parent, bitfield } => {
                    let raw = self.snapshot(parent, snapshot).await?;
                    known.insert(name, parent.decode_subfield(&raw, bitfield)?);
                    pending.pop();
                }
                FieldRef::Register(reg) => {
                    let missing: Vec<String> = reg
                        .deps()
                        .iter()
                        .filter(|dep| !known.contains(dep))
                        .cloned()
                        .collect();
                    if missing.is_empty() {
                        let deps = reg.collect_deps(&known, &Record::new())?;
                        let raw = self.snapshot(reg, snapshot).await?;
                        known.insert(name, reg.decode(&raw, &deps)?);
                        pending.pop();
                    } else if expanded.insert(name.clone()) {
                        pending.extend(missing);
                    } else {
                        return Err(DecodeError::InvalidDescriptor {
                            field: name,
                            reason: String::from("circular dependency"),
                        }
                        .into());
                    }
                }
                FieldRef::Group(_) => return Err(DecodeError::UnknownField(name).into()),
            }
        }
        Ok(known)
    }
}

#[cfg(test)]
mod tests {
    use super::RegisterAccess;
    use crate::test_utils::test_logger;
    use crate::DecodeError;
    use crate::Error;
    use crate::MockModule;
    use xcvr_decode::codes::CONNECTORS;
    use xcvr_decode::profile::cdb as cdb_fields;
    use xcvr_decode::profile::cmis;
    use xcvr_decode::CommandResult;
    use xcvr_decode::GroupField;
    use xcvr_decode::MemoryMap;
    use xcvr_decode::NumberFormat;
    use xcvr_decode::Profile;
    use xcvr_decode::RegisterField;
    use xcvr_decode::Value;
    use xcvr_messages::cdb::STATUS_ADDRESS;
    use xcvr_messages::mgmt::Address;

    fn module() -> MockModule {
        let mut module = MockModule::new();
        module.load(Address::new(0x00, 128), &[0x18]).unwrap();
        module.load(Address::new(0x00, 14), &[0x19, 0x80]).unwrap();
        module.load(Address::new(0x00, 129), b"Oxide Computer  ").unwrap();
        module.load(Address::new(0x00, 203), &[0x07]).unwrap();
        module
    }

    #[tokio::test]
    async fn test_read_by_name() {
        let profile = Profile::cmis().unwrap();
        let mut module = module();
        let mut access = RegisterAccess::new(&mut module, profile.map(), 8, &test_logger());
        assert_eq!(
            access.read_by_name(cmis::VENDOR_NAME).await.unwrap(),
            Value::Text(String::from("Oxide Computer"))
        );
        assert_eq!(
            access.read_by_name(cmis::TEMPERATURE).await.unwrap(),
            Value::Float(25.5)
        );
        assert!(matches!(
            access.read_by_name("NoSuchField").await,
            Err(Error::Decode(DecodeError::UnknownField(_)))
        ));
    }

    #[tokio::test]
    async fn test_read_resolves_dependencies() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        module.load(STATUS_ADDRESS, &[0x45]).unwrap();
        let mut access = RegisterAccess::new(&mut module, profile.map(), 8, &test_logger());

        // The command result depends on subfields of the status register,
        // which are read on demand.
        assert_eq!(
            access.read_by_name(cdb_fields::COMMAND_RESULT).await.unwrap(),
            Value::CommandResult(CommandResult::Failed { detail: 5 })
        );
        // One snapshot of the status register serves every dependency.
        assert_eq!(access.bus_mut().n_reads(), 1);
        assert_eq!(
            access.read_by_name(cdb_fields::IS_BUSY).await.unwrap(),
            Value::Bool(false)
        );
        let Value::Record(group) = access
            .read_by_name(cdb_fields::STATUS_GROUP)
            .await
            .unwrap()
        else {
            panic!("expected a record");
        };
        assert_eq!(group.get(cdb_fields::STATUS), Some(&Value::Unsigned(5)));
    }

    #[tokio::test]
    async fn test_unknown_code_does_not_affect_siblings() {
        let map = MemoryMap::new([GroupField::new(
            "Group",
            [
                RegisterField::code("Connector", Address::new(0x00, 203), &CONNECTORS).into(),
                RegisterField::number("Revision", Address::new(0x00, 1), NumberFormat::U8)
                    .into(),
            ],
        )
        .into()])
        .unwrap();
        let mut module = MockModule::new();
        module.load(Address::new(0x00, 203), &[0xee]).unwrap();
        module.load(Address::new(0x00, 1), &[0x50]).unwrap();
        let mut access = RegisterAccess::new(&mut module, &map, 8, &test_logger());
        let record = access.read_by_name("Group").await.unwrap();
        let record = record.as_record().unwrap();
        assert_eq!(record.get("Connector"), Some(&Value::UnknownCode(0xee)));
        assert_eq!(record.get("Revision"), Some(&Value::Unsigned(0x50)));
    }

    #[tokio::test]
    async fn test_bus_failure_is_not_a_value() {
        let profile = Profile::cmis().unwrap();
        let mut module = module();
        module.fail_next_reads(1);
        let mut access = RegisterAccess::new(&mut module, profile.map(), 8, &test_logger());
        assert!(matches!(
            access.read_by_name(cmis::IDENTIFIER).await,
            Err(Error::Bus(_))
        ));
        assert!(matches!(
            access.read_by_name(cmis::IDENTIFIER).await,
            Ok(Value::Code { raw: 0x18, .. })
        ));
    }

    #[tokio::test]
    async fn test_write_read_only_never_reaches_bus() {
        let profile = Profile::cmis().unwrap();
        let mut module = module();
        {
            let mut access =
                RegisterAccess::new(&mut module, profile.map(), 8, &test_logger());
            assert_eq!(
                access
                    .write_by_name(cmis::VENDOR_NAME, &Value::Text(String::from("x")))
                    .await,
                Err(Error::Decode(DecodeError::ReadOnlyViolation(String::from(
                    cmis::VENDOR_NAME
                ))))
            );
        }
        assert!(module.writes().is_empty());
        assert_eq!(module.n_reads(), 0);
    }

    #[tokio::test]
    async fn test_write_subfield_read_modify_write() {
        let profile = Profile::cmis().unwrap();
        let mut module = MockModule::new();
        let control = Address::new(0x00, 26);
        module.load(control, &[0b0100_0001]).unwrap();
        {
            let mut access =
                RegisterAccess::new(&mut module, profile.map(), 8, &test_logger());
            access
                .write_by_name(cmis::LOW_POWER_REQUEST_SW, &Value::Bool(true))
                .await
                .unwrap();
        }
        assert_eq!(module.writes(), &[(control, vec![0b0101_0001])]);
    }

    #[tokio::test]
    async fn test_write_named_subfield() {
        let map = MemoryMap::new([RegisterField::number(
            "Control",
            Address::new(0x00, 26),
            NumberFormat::U8,
        )
        .subfield("Mode", 0, 2)
        .writable()
        .into()])
        .unwrap();
        let mut module = MockModule::new();
        module.load(Address::new(0x00, 26), &[0b1000_0001]).unwrap();
        {
            let mut access = RegisterAccess::new(&mut module, &map, 8, &test_logger());
            access
                .write_by_name("Mode", &Value::Unsigned(0b10))
                .await
                .unwrap();
            assert_eq!(
                access.read_by_name("Mode").await.unwrap(),
                Value::Unsigned(0b10)
            );
        }
        assert_eq!(module.peek(Address::new(0x00, 26), 1).unwrap(), &[0b1000_0010]);
    }

    #[tokio::test]
    async fn test_write_splits_large_writes() {
        let map = MemoryMap::new([RegisterField::hex("Scratch", Address::new(0x9f, 130), 20)
            .writable()
            .into()])
        .unwrap();
        let mut module = MockModule::new();
        {
            let mut access = RegisterAccess::new(&mut module, &map, 8, &test_logger());
            access
                .write_by_name("Scratch", &Value::Hex((0..20).collect()))
                .await
                .unwrap();
        }
        let lens: Vec<_> = module.writes().iter().map(|(_, d)| d.len()).collect();
        assert_eq!(lens, vec![8, 8, 4]);
        assert_eq!(module.writes()[1].0, Address::new(0x9f, 138));
    }
}
