// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! A validated collection of fields, indexed by name.

use crate::BitField;
use crate::Error;
use crate::Field;
use crate::GroupField;
use crate::RegisterField;
use std::collections::BTreeMap;
use xcvr_messages::cdb::Command;
use xcvr_messages::cdb::CommandCatalog;

// The position of a named item in the field tree.
#[derive(Clone, Debug)]
enum Location {
    Field(Vec<usize>),
    Bits(Vec<usize>, usize),
}

/// A reference to a named item in a memory map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldRef<'a> {
    Register(&'a RegisterField),
    Group(&'a GroupField),
    /// A named bit range within a register.
    Bits {
        parent: &'a RegisterField,
        bitfield: &'a BitField,
    },
}

impl FieldRef<'_> {
    pub fn name(&self) -> &str {
        match self {
            FieldRef::Register(reg) => reg.name(),
            FieldRef::Group(group) => group.name(),
            FieldRef::Bits { bitfield, .. } => bitfield.name(),
        }
    }
}

/// The register map of a module.
///
/// Construction checks every descriptor, and that names are unique and
/// dependencies resolve. A map is immutable once built.
#[derive(Clone, Debug)]
pub struct MemoryMap {
    fields: Vec<Field>,
    index: BTreeMap<String, Location>,
}

impl MemoryMap {
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Result<Self, Error> {
        let fields: Vec<Field> = fields.into_iter().collect();
        let mut index = BTreeMap::new();
        for (i, field) in fields.iter().enumerate() {
            Self::index_field(field, vec![i], &mut index)?;
        }
        let map = Self { fields, index };

        // Dependencies must name something with a value of its own.
        for reg in map.registers() {
            for dep in reg.deps() {
                match map.get(dep) {
                    Some(FieldRef::Register(_)) | Some(FieldRef::Bits { .. }) => {}
                    _ => return Err(Error::UnknownField(dep.clone())),
                }
            }
        }
        Ok(map)
    }

    fn insert(
        index: &mut BTreeMap<String, Location>,
        name: &str,
        location: Location,
    ) -> Result<(), Error> {
        if index.insert(name.to_string(), location).is_some() {
            return Err(Error::DuplicateField(name.to_string()));
        }
        Ok(())
    }

    fn index_field(
        field: &Field,
        path: Vec<usize>,
        index: &mut BTreeMap<String, Location>,
    ) -> Result<(), Error> {
        match field {
            Field::Register(reg) => {
                reg.validate()?;
                for (i, bf) in reg.subfields().iter().enumerate() {
                    Self::insert(index, bf.name(), Location::Bits(path.clone(), i))?;
                }
                Self::insert(index, reg.name(), Location::Field(path))
            }
            Field::Group(group) => {
                for (i, child) in group.children().iter().enumerate() {
                    let mut child_path = path.clone();
                    child_path.push(i);
                    Self::index_field(child, child_path, index)?;
                }
                Self::insert(index, group.name(), Location::Field(path))
            }
        }
    }

    fn resolve(&self, path: &[usize]) -> Option<&Field> {
        let (first, rest) = path.split_first()?;
        let mut field = self.fields.get(*first)?;
        for i in rest {
            match field {
                Field::Group(group) => field = group.children().get(*i)?,
                Field::Register(_) => return None,
            }
        }
        Some(field)
    }

    /// Look up a field, group or subfield by name.
    pub fn get(&self, name: &str) -> Option<FieldRef<'_>> {
        match self.index.get(name)? {
            Location::Field(path) => match self.resolve(path)? {
                Field::Register(reg) => Some(FieldRef::Register(reg)),
                Field::Group(group) => Some(FieldRef::Group(group)),
            },
            Location::Bits(path, i) => match self.resolve(path)? {
                Field::Register(parent) => Some(FieldRef::Bits {
                    parent,
                    bitfield: parent.subfields().get(*i)?,
                }),
                Field::Group(_) => None,
            },
        }
    }

    /// Look up a name, failing if it's not in the map.
    pub fn lookup(&self, name: &str) -> Result<FieldRef<'_>, Error> {
        self.get(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))
    }

    /// The top-level fields of the map, in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Every name in the map, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.index.keys().map(String::as_str)
    }

    /// Every register field in the map, depth-first.
    pub fn registers(&self) -> Vec<&RegisterField> {
        let mut out = Vec::new();
        for field in &self.fields {
            match field {
                Field::Register(reg) => out.push(reg),
                Field::Group(group) => out.extend(group.registers()),
            }
        }
        out
    }
}

/// The fields and CDB commands supported by one kind of module.
#[derive(Clone, Debug)]
pub struct Profile {
    name: &'static str,
    map: MemoryMap,
    commands: CommandCatalog,
}

impl Profile {
    pub fn new(name: &'static str, map: MemoryMap, commands: CommandCatalog) -> Result<Self, Error> {
        // Every reply field must exist.
        for cmd in commands.iter() {
            if let Some(reply) = cmd.reply() {
                map.lookup(reply)?;
            }
        }
        Ok(Self {
            name,
            map,
            commands,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn map(&self) -> &MemoryMap {
        &self.map
    }

    pub fn commands(&self) -> &CommandCatalog {
        &self.commands
    }

    /// Look up a CDB command by id.
    pub fn command(&self, id: u16) -> Option<&Command> {
        self.commands.get(id)
    }

    /// Return the field describing a command's reply, if it has one.
    pub fn reply_field(&self, command: &Command) -> Option<FieldRef<'_>> {
        command.reply().and_then(|name| self.map.get(name))
    }
}
