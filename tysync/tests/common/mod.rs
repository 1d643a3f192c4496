//! Recording frontend shared by the integration tests.
//!
//! Every mutation and visitor call is appended to `Recorder::calls` as a
//! short line of text; type handles are rendered C-style (`i32*`, `%Foo`).

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use tysync::frontend::{
    DataVisitor, EnumVisitor, ExistingFunction, Frontend, FunctionVisitor, StructMember,
    StructVisitor, UnionVisitor,
};
use tysync::heuristics::RuleSet;
use tysync::model::{BaseType, EnumDef, StructDef, UnionDef};
use tysync::tyyaml::TypeBackend;

pub struct Recorder {
    pub calls: Vec<String>,
    pub enums: HashMap<String, EnumDef>,
    pub union_names: HashMap<String, Vec<String>>,
    pub struct_names: HashMap<String, BTreeMap<u64, String>>,
    pub functions: HashMap<u64, ExistingFunction<String>>,
    pub symbols: HashMap<u64, String>,
    member_rules: RuleSet,
    symbol_rules: RuleSet,
}

impl Default for Recorder {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            enums: HashMap::new(),
            union_names: HashMap::new(),
            struct_names: HashMap::new(),
            functions: HashMap::new(),
            symbols: HashMap::new(),
            member_rules: RuleSet::members(),
            symbol_rules: RuleSet::symbols(),
        }
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(member_rules: RuleSet, symbol_rules: RuleSet) -> Self {
        Self {
            member_rules,
            symbol_rules,
            ..Self::default()
        }
    }

    /// Seed an existing function with named arguments.
    pub fn seed_function(&mut self, addr: u64, arg_names: &[&str], signature: &str) {
        self.functions.insert(
            addr,
            ExistingFunction {
                arg_names: arg_names.iter().map(|n| n.to_string()).collect(),
                signature: signature.to_string(),
            },
        );
    }

    pub fn take_calls(&mut self) -> Vec<String> {
        std::mem::take(&mut self.calls)
    }

    fn log(&mut self, call: String) {
        self.calls.push(call);
    }
}

impl TypeBackend for Recorder {
    type Type = String;

    fn base(&mut self, base: BaseType) -> Result<String> {
        Ok(base.token().to_string())
    }

    fn pointer(&mut self, pointee: String) -> Result<String> {
        Ok(format!("{pointee}*"))
    }

    fn array(&mut self, element: String, len: u64) -> Result<String> {
        Ok(format!("{element}[{len}]"))
    }

    fn subroutine(&mut self, ret: String, args: Vec<String>) -> Result<String> {
        Ok(format!("{ret}({})", args.join(", ")))
    }

    fn name(&mut self, ident: &str) -> Result<Option<String>> {
        Ok((!ident.starts_with('(')).then(|| ident.to_string()))
    }

    fn named(&mut self, name: &str) -> Result<String> {
        Ok(format!("%{name}"))
    }
}

impl Frontend for Recorder {
    type Signature = String;
    type StructImport = RecordStruct;
    type UnionImport = RecordUnion;
    type EnumImport = RecordEnum;
    type FunctionImport = RecordFunction;
    type DataImport = RecordData;

    fn member_rules(&self) -> &RuleSet {
        &self.member_rules
    }

    fn symbol_rules(&self) -> &RuleSet {
        &self.symbol_rules
    }

    fn vtable_struct_name(&self, owner: &str) -> String {
        format!("{owner}_vtbl")
    }

    fn existing_enum(&mut self, name: &str) -> Result<Option<EnumDef>> {
        Ok(self.enums.get(name).cloned())
    }

    fn existing_union_member_names(&mut self, name: &str) -> Result<Vec<String>> {
        Ok(self.union_names.get(name).cloned().unwrap_or_default())
    }

    fn existing_struct_member_names(&mut self, name: &str) -> Result<BTreeMap<u64, String>> {
        Ok(self.struct_names.get(name).cloned().unwrap_or_default())
    }

    fn existing_function(&mut self, addr: u64) -> Result<Option<ExistingFunction<String>>> {
        Ok(self.functions.get(&addr).cloned())
    }

    fn symbol_name(&mut self, addr: u64) -> Result<Option<String>> {
        Ok(self.symbols.get(&addr).cloned())
    }

    fn set_symbol_name(&mut self, addr: u64, name: &str) -> Result<()> {
        self.log(format!("rename {addr:#x} {name}"));
        self.symbols.insert(addr, name.to_string());
        Ok(())
    }

    fn struct_visitor(&mut self, name: &str, def: &StructDef) -> Result<RecordStruct> {
        self.log(format!("open struct {name} size={} align={}", def.size, def.align));
        Ok(RecordStruct(name.to_string()))
    }

    fn union_visitor(&mut self, name: &str, _def: &UnionDef) -> Result<RecordUnion> {
        self.log(format!("open union {name}"));
        Ok(RecordUnion(name.to_string()))
    }

    fn enum_visitor(&mut self, name: &str, _old: &EnumDef, _new: &EnumDef) -> Result<RecordEnum> {
        self.log(format!("open enum {name}"));
        Ok(RecordEnum(name.to_string()))
    }

    fn function_visitor(&mut self, addr: u64, name: &str) -> Result<RecordFunction> {
        self.log(format!("open function {addr:#x} {name}"));
        Ok(RecordFunction(addr))
    }

    fn data_visitor(&mut self, addr: u64, name: &str) -> Result<RecordData> {
        self.log(format!("open data {addr:#x} {name}"));
        Ok(RecordData(addr))
    }
}

pub struct RecordStruct(String);

impl StructVisitor<Recorder> for RecordStruct {
    fn visit_alignment(&mut self, fe: &mut Recorder, align: u64) -> Result<()> {
        fe.log(format!("{}: alignment {align}", self.0));
        Ok(())
    }

    fn visit_member(&mut self, fe: &mut Recorder, m: StructMember<String>) -> Result<()> {
        let mut line = format!("{}: member {} {} {}", self.0, m.offset, m.name, m.ty);
        if m.is_vtable {
            line.push_str(" (vtable)");
        }
        if m.is_base {
            line.push_str(" (base)");
        }
        fe.log(line);
        Ok(())
    }

    fn visit_size(&mut self, fe: &mut Recorder, size: u64) -> Result<()> {
        fe.log(format!("{}: size {size}", self.0));
        Ok(())
    }

    fn finish(self, fe: &mut Recorder) -> Result<()> {
        fe.log(format!("{}: finish", self.0));
        Ok(())
    }
}

pub struct RecordUnion(String);

impl UnionVisitor<Recorder> for RecordUnion {
    fn visit_alignment(&mut self, fe: &mut Recorder, align: u64) -> Result<()> {
        fe.log(format!("{}: alignment {align}", self.0));
        Ok(())
    }

    fn visit_member(&mut self, fe: &mut Recorder, name: &str, ty: String) -> Result<()> {
        fe.log(format!("{}: member {name} {ty}", self.0));
        Ok(())
    }

    fn visit_size(&mut self, fe: &mut Recorder, size: u64) -> Result<()> {
        fe.log(format!("{}: size {size}", self.0));
        Ok(())
    }

    fn finish(self, fe: &mut Recorder) -> Result<()> {
        fe.log(format!("{}: finish", self.0));
        Ok(())
    }
}

pub struct RecordEnum(String);

impl EnumVisitor<Recorder> for RecordEnum {
    fn visit_size(&mut self, fe: &mut Recorder, size: u64) -> Result<()> {
        fe.log(format!("{}: size {size}", self.0));
        Ok(())
    }

    fn visit_enumerator(&mut self, fe: &mut Recorder, name: &str, value: i64) -> Result<()> {
        fe.log(format!("{}: {name} = {value}", self.0));
        Ok(())
    }

    fn finish(self, fe: &mut Recorder) -> Result<()> {
        fe.log(format!("{}: finish", self.0));
        Ok(())
    }
}

pub struct RecordFunction(u64);

impl FunctionVisitor<Recorder> for RecordFunction {
    fn visit_rettype(&mut self, fe: &mut Recorder, ty: String) -> Result<()> {
        fe.log(format!("{:#x}: return {ty}", self.0));
        Ok(())
    }

    fn visit_old_rettype(&mut self, fe: &mut Recorder, old: &String) -> Result<()> {
        fe.log(format!("{:#x}: old return of {old}", self.0));
        Ok(())
    }

    fn visit_dummy_rettype(&mut self, fe: &mut Recorder) -> Result<()> {
        fe.log(format!("{:#x}: dummy return", self.0));
        Ok(())
    }

    fn visit_argument(&mut self, fe: &mut Recorder, name: &str, ty: String) -> Result<()> {
        fe.log(format!("{:#x}: argument {name} {ty}", self.0));
        Ok(())
    }

    fn visit_old_argument(
        &mut self,
        fe: &mut Recorder,
        name: &str,
        index: usize,
        old: &String,
    ) -> Result<()> {
        fe.log(format!("{:#x}: argument {name} old #{index} of {old}", self.0));
        Ok(())
    }

    fn visit_dummy_argument(&mut self, fe: &mut Recorder, name: &str) -> Result<()> {
        fe.log(format!("{:#x}: argument {name} dummy", self.0));
        Ok(())
    }

    fn finish(self, fe: &mut Recorder) -> Result<()> {
        fe.log(format!("{:#x}: finish", self.0));
        Ok(())
    }
}

pub struct RecordData(u64);

impl DataVisitor<Recorder> for RecordData {
    fn visit_data_type(&mut self, fe: &mut Recorder, ty: String) -> Result<()> {
        fe.log(format!("{:#x}: type {ty}", self.0));
        Ok(())
    }

    fn finish(self, fe: &mut Recorder) -> Result<()> {
        fe.log(format!("{:#x}: finish", self.0));
        Ok(())
    }
}
