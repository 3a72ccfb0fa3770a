use std::borrow::Cow;

use super::pool::Reader;
use super::{ClassFileError, ConstantPool};

const MAGIC: u32 = 0xCAFE_BABE;

/// One field or method entry. Attribute payloads stay raw; they reference
/// the pool by index, so pool edits never invalidate them.
#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub data: Vec<u8>,
}

/// One compiled class, parsed far enough to scan and remap it. Immutable
/// apart from pool rewrites performed by the remapper.
#[derive(Debug, Clone)]
pub struct ObjectCodeUnit {
    pub minor_version: u16,
    pub major_version: u16,
    pub pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ObjectCodeUnit {
    pub fn parse(data: &[u8]) -> Result<Self, ClassFileError> {
        let mut r = Reader::new(data);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::BadMagic(magic));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let pool = ConstantPool::parse(&mut r)?;
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;
        let interface_count = r.u16()? as usize;
        let mut interfaces = Vec::with_capacity(interface_count);
        for _ in 0..interface_count {
            interfaces.push(r.u16()?);
        }
        let fields = parse_members(&mut r)?;
        let methods = parse_members(&mut r)?;
        let attributes = parse_attributes(&mut r)?;
        Ok(Self {
            minor_version,
            major_version,
            pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&self.minor_version.to_be_bytes());
        out.extend_from_slice(&self.major_version.to_be_bytes());
        self.pool.write(&mut out);
        out.extend_from_slice(&self.access_flags.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for iface in &self.interfaces {
            out.extend_from_slice(&iface.to_be_bytes());
        }
        write_members(&mut out, &self.fields);
        write_members(&mut out, &self.methods);
        write_attributes(&mut out, &self.attributes);
        out
    }

    /// Internal name of this class, e.g. `com/example/MyApp`.
    pub fn name(&self) -> Cow<'_, str> {
        self.pool
            .class_name(self.this_class)
            .unwrap_or(Cow::Borrowed("<unnamed>"))
    }

    /// Internal name of the superclass; `None` for `java/lang/Object`.
    pub fn super_name(&self) -> Option<Cow<'_, str>> {
        if self.super_class == 0 {
            return None;
        }
        self.pool.class_name(self.super_class)
    }

    pub fn interface_names(&self) -> impl Iterator<Item = Cow<'_, str>> {
        self.interfaces
            .iter()
            .filter_map(|idx| self.pool.class_name(*idx))
    }

    pub fn attribute_name(&self, attr: &AttributeInfo) -> Option<Cow<'_, str>> {
        self.pool.utf8(attr.name_index)
    }

    pub fn member_name(&self, member: &MemberInfo) -> Option<Cow<'_, str>> {
        self.pool.utf8(member.name_index)
    }

    pub fn member_descriptor(&self, member: &MemberInfo) -> Option<Cow<'_, str>> {
        self.pool.utf8(member.descriptor_index)
    }

    /// The raw payload of the member's `Code` attribute, if it has one.
    pub fn code_attribute<'a>(&self, member: &'a MemberInfo) -> Option<&'a [u8]> {
        member.attributes.iter().find_map(|attr| {
            (self.attribute_name(attr).as_deref() == Some("Code")).then_some(attr.data.as_slice())
        })
    }
}

fn parse_members(r: &mut Reader) -> Result<Vec<MemberInfo>, ClassFileError> {
    let count = r.u16()? as usize;
    let mut members = Vec::with_capacity(count);
    for _ in 0..count {
        let access_flags = r.u16()?;
        let name_index = r.u16()?;
        let descriptor_index = r.u16()?;
        let attributes = parse_attributes(r)?;
        members.push(MemberInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
    }
    Ok(members)
}

fn parse_attributes(r: &mut Reader) -> Result<Vec<AttributeInfo>, ClassFileError> {
    let count = r.u16()? as usize;
    let mut attributes = Vec::with_capacity(count);
    for _ in 0..count {
        let name_index = r.u16()?;
        let len = r.u32()? as usize;
        let data = r.bytes(len)?.to_vec();
        attributes.push(AttributeInfo { name_index, data });
    }
    Ok(attributes)
}

fn write_members(out: &mut Vec<u8>, members: &[MemberInfo]) {
    out.extend_from_slice(&(members.len() as u16).to_be_bytes());
    for member in members {
        out.extend_from_slice(&member.access_flags.to_be_bytes());
        out.extend_from_slice(&member.name_index.to_be_bytes());
        out.extend_from_slice(&member.descriptor_index.to_be_bytes());
        write_attributes(out, &member.attributes);
    }
}

fn write_attributes(out: &mut Vec<u8>, attributes: &[AttributeInfo]) {
    out.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
    for attr in attributes {
        out.extend_from_slice(&attr.name_index.to_be_bytes());
        out.extend_from_slice(&(attr.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&attr.data);
    }
}
