//! Shared test helpers: a minimal JVM class-file byte builder, enough to
//! synthesize fixtures for the scanner and remapper without a Java
//! toolchain.

#![allow(dead_code)]

/// Builds constant pool entries and hands out their indices.
pub struct PoolBuilder {
    entries: Vec<u8>,
    next_index: u16,
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_index: 1,
        }
    }

    fn take_index(&mut self) -> u16 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    pub fn utf8(&mut self, text: &str) -> u16 {
        self.entries.push(1);
        self.entries
            .extend_from_slice(&(text.len() as u16).to_be_bytes());
        self.entries.extend_from_slice(text.as_bytes());
        self.take_index()
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.entries.push(7);
        self.entries.extend_from_slice(&name_index.to_be_bytes());
        self.take_index()
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.entries.push(12);
        self.entries.extend_from_slice(&name_index.to_be_bytes());
        self.entries
            .extend_from_slice(&descriptor_index.to_be_bytes());
        self.take_index()
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let nat_index = self.name_and_type(name, descriptor);
        self.entries.push(10);
        self.entries.extend_from_slice(&class_index.to_be_bytes());
        self.entries.extend_from_slice(&nat_index.to_be_bytes());
        self.take_index()
    }
}

struct MethodSpec {
    access: u16,
    name_index: u16,
    descriptor_index: u16,
    code: Option<Vec<u8>>,
}

/// Assembles one synthetic class file.
pub struct ClassBuilder {
    pub pool: PoolBuilder,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<(u16, u16, u16)>,
    methods: Vec<MethodSpec>,
    code_name_index: Option<u16>,
}

impl ClassBuilder {
    pub fn new(name: &str, super_name: &str) -> Self {
        let mut pool = PoolBuilder::new();
        let this_class = pool.class(name);
        let super_class = pool.class(super_name);
        Self {
            pool,
            access: 0x0021, // public super
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            code_name_index: None,
        }
    }

    pub fn set_access(&mut self, access: u16) {
        self.access = access;
    }

    pub fn add_interface(&mut self, name: &str) {
        let index = self.pool.class(name);
        self.interfaces.push(index);
    }

    pub fn add_field(&mut self, name: &str, descriptor: &str) {
        let name_index = self.pool.utf8(name);
        let descriptor_index = self.pool.utf8(descriptor);
        self.fields.push((0x0002, name_index, descriptor_index));
    }

    /// Adds an abstract method (no Code attribute), as on interfaces.
    pub fn add_abstract_method(&mut self, name: &str, descriptor: &str) {
        let name_index = self.pool.utf8(name);
        let descriptor_index = self.pool.utf8(descriptor);
        self.methods.push(MethodSpec {
            access: 0x0401, // public abstract
            name_index,
            descriptor_index,
            code: None,
        });
    }

    /// Adds a concrete method whose Code attribute wraps the given raw
    /// bytecode.
    pub fn add_method_with_code(&mut self, name: &str, descriptor: &str, bytecode: Vec<u8>) {
        if self.code_name_index.is_none() {
            self.code_name_index = Some(self.pool.utf8("Code"));
        }
        let name_index = self.pool.utf8(name);
        let descriptor_index = self.pool.utf8(descriptor);
        self.methods.push(MethodSpec {
            access: 0x0001,
            name_index,
            descriptor_index,
            code: Some(bytecode),
        });
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // minor
        out.extend_from_slice(&52u16.to_be_bytes()); // major (Java 8)
        out.extend_from_slice(&self.pool.next_index.to_be_bytes());
        out.extend_from_slice(&self.pool.entries);
        out.extend_from_slice(&self.access.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }
        out.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());
        for (access, name, descriptor) in &self.fields {
            out.extend_from_slice(&access.to_be_bytes());
            out.extend_from_slice(&name.to_be_bytes());
            out.extend_from_slice(&descriptor.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes()); // no attributes
        }
        out.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for method in &self.methods {
            out.extend_from_slice(&method.access.to_be_bytes());
            out.extend_from_slice(&method.name_index.to_be_bytes());
            out.extend_from_slice(&method.descriptor_index.to_be_bytes());
            match &method.code {
                None => out.extend_from_slice(&0u16.to_be_bytes()),
                Some(bytecode) => {
                    out.extend_from_slice(&1u16.to_be_bytes());
                    let code_name = self
                        .code_name_index
                        .expect("Code name interned when a code method was added");
                    out.extend_from_slice(&code_name.to_be_bytes());
                    // max_stack + max_locals + code_length + code + empty
                    // exception table + empty attribute table
                    let attr_len = 2 + 2 + 4 + bytecode.len() + 2 + 2;
                    out.extend_from_slice(&(attr_len as u32).to_be_bytes());
                    out.extend_from_slice(&8u16.to_be_bytes()); // max_stack
                    out.extend_from_slice(&8u16.to_be_bytes()); // max_locals
                    out.extend_from_slice(&(bytecode.len() as u32).to_be_bytes());
                    out.extend_from_slice(bytecode);
                    out.extend_from_slice(&0u16.to_be_bytes()); // exceptions
                    out.extend_from_slice(&0u16.to_be_bytes()); // attributes
                }
            }
        }
        out.extend_from_slice(&0u16.to_be_bytes()); // class attributes
        out
    }
}

/// Bytecode helpers used by the fixtures.
pub fn invoke_virtual(method_ref: u16) -> Vec<u8> {
    vec![
        0xb6,
        (method_ref >> 8) as u8,
        (method_ref & 0xff) as u8,
        0xb1, // return
    ]
}

pub fn new_instance(class_index: u16) -> Vec<u8> {
    vec![
        0xbb,
        (class_index >> 8) as u8,
        (class_index & 0xff) as u8,
        0x57, // pop
        0xb1, // return
    ]
}
