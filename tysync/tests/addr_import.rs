//! Function and data import: symbol renames, signature reconciliation.

mod common;

use common::Recorder;
use pretty_assertions::assert_eq;
use tysync::model::{BaseType, FunctionDef, MemberDef, NameAndType, StructDef, TypeExpr};
use tysync::{AddrRegistry, ImportOptions, TypeRegistry};

const UPPER: u32 = 0x7100;
const UPDATE: u64 = 0x0010_2030;
const UPDATE_ADDR: u64 = 0x0000_7100_0010_2030;
const INSTANCE: u64 = 0x0020_0000;

fn options() -> ImportOptions {
    ImportOptions {
        upper: UPPER,
        skip_types: true,
        ..ImportOptions::default()
    }
}

fn run(fe: &mut Recorder, addrs: &AddrRegistry, options: &ImportOptions) {
    tysync::run_import(fe, &TypeRegistry::new(), addrs, options).unwrap();
}

fn arg(name: &str, ty: Option<TypeExpr>) -> NameAndType {
    NameAndType::new(name, ty)
}

#[test]
fn argument_names_not_reused_when_count_changes() {
    let mut addrs = AddrRegistry::new(UPPER);
    addrs
        .add_function(
            UPDATE,
            FunctionDef::new(
                "_ZN5Actor6updateEf",
                None,
                vec![
                    arg("self", Some(TypeExpr::named("Actor").ptr())),
                    arg("delta", None),
                    arg("flags", None),
                ],
            ),
        )
        .unwrap();
    let mut fe = Recorder::new();
    fe.seed_function(UPDATE_ADDR, &["this", "dt"], "void(Actor*, f32)");

    run(&mut fe, &addrs, &options());
    assert_eq!(
        fe.calls,
        vec![
            "rename 0x710000102030 _ZN5Actor6updateEf",
            "open function 0x710000102030 _ZN5Actor6updateEf",
            "0x710000102030: old return of void(Actor*, f32)",
            "0x710000102030: argument self %Actor*",
            "0x710000102030: argument delta old #1 of void(Actor*, f32)",
            "0x710000102030: argument flags dummy",
            "0x710000102030: finish",
        ]
    );
}

#[test]
fn argument_names_reconciled_when_count_matches() {
    let mut addrs = AddrRegistry::new(UPPER);
    addrs
        .add_function(
            UPDATE,
            FunctionDef::new(
                "",
                Some(BaseType::Bool.into()),
                vec![arg("_this", Some(BaseType::I32.into())), arg("dt", Some(BaseType::F32.into()))],
            ),
        )
        .unwrap();
    let mut fe = Recorder::new();
    fe.seed_function(UPDATE_ADDR, &["this", "a2"], "void(Actor*, f32)");

    run(&mut fe, &addrs, &options());
    assert_eq!(
        fe.calls,
        vec![
            "open function 0x710000102030 ",
            "0x710000102030: return bool",
            "0x710000102030: argument this i32",
            "0x710000102030: argument dt f32",
            "0x710000102030: finish",
        ]
    );
}

#[test]
fn unknown_types_become_dummies() {
    let mut addrs = AddrRegistry::new(UPPER);
    addrs
        .add_function(UPDATE, FunctionDef::new("sub_102030", None, vec![arg("a1", None)]))
        .unwrap();
    let mut fe = Recorder::new();
    run(&mut fe, &addrs, &options());
    assert_eq!(
        fe.calls,
        vec![
            "rename 0x710000102030 sub_102030",
            "open function 0x710000102030 sub_102030",
            "0x710000102030: dummy return",
            "0x710000102030: argument a1 dummy",
            "0x710000102030: finish",
        ]
    );
}

#[test]
fn symbol_rename_heuristics() {
    let cases = [
        // (existing, new, renamed)
        ("sub_102030", "Actor_update", true),
        ("MyUpdate", "_ZN5Actor6updateEf", true),
        ("_ZN5Actor6updateEf", "update", false),
        ("MyUpdate", "sub_102030", false),
        ("MyUpdate", "OtherUpdate", false),
        ("", "OtherUpdate", true),
    ];
    for (existing, new, renamed) in cases {
        let mut addrs = AddrRegistry::new(UPPER);
        addrs.add_function(UPDATE, FunctionDef::new(new, None, vec![])).unwrap();
        let mut fe = Recorder::new();
        fe.symbols.insert(UPDATE_ADDR, existing.to_string());

        run(&mut fe, &addrs, &ImportOptions { name_only: true, ..options() });
        let expected = if renamed {
            vec![format!("rename 0x710000102030 {new}")]
        } else {
            vec![]
        };
        assert_eq!(fe.calls, expected, "{existing} -> {new}");
    }
}

#[test]
fn same_name_is_not_renamed() {
    let mut addrs = AddrRegistry::new(UPPER);
    addrs.add_data(INSTANCE, arg("sInstance", None)).unwrap();
    let mut fe = Recorder::new();
    fe.symbols.insert(0x0000_7100_0020_0000, "sInstance".to_string());
    run(&mut fe, &addrs, &options());
    assert!(fe.calls.is_empty(), "{:?}", fe.calls);
}

#[test]
fn name_only_skips_types() {
    let mut addrs = AddrRegistry::new(UPPER);
    addrs
        .add_function(UPDATE, FunctionDef::new("Actor_update", Some(BaseType::Void.into()), vec![]))
        .unwrap();
    addrs
        .add_data(INSTANCE, arg("sInstance", Some(BaseType::U32.into())))
        .unwrap();
    let mut fe = Recorder::new();
    run(&mut fe, &addrs, &ImportOptions { name_only: true, ..options() });
    assert_eq!(
        fe.calls,
        vec![
            "rename 0x710000200000 sInstance",
            "rename 0x710000102030 Actor_update",
        ]
    );
}

#[test]
fn data_imported_before_functions() {
    let mut addrs = AddrRegistry::new(UPPER);
    addrs
        .add_function(UPDATE, FunctionDef::new("Actor_update", Some(BaseType::Void.into()), vec![]))
        .unwrap();
    addrs
        .add_data(INSTANCE, arg("sInstance", Some(TypeExpr::named("Actor").ptr())))
        .unwrap();
    addrs.add_data(0x0020_0008, arg("sCount", None)).unwrap();
    let mut fe = Recorder::new();
    run(&mut fe, &addrs, &options());
    assert_eq!(
        fe.calls,
        vec![
            "rename 0x710000200000 sInstance",
            "open data 0x710000200000 sInstance",
            "0x710000200000: type %Actor*",
            "0x710000200000: finish",
            "rename 0x710000200008 sCount",
            "rename 0x710000102030 Actor_update",
            "open function 0x710000102030 Actor_update",
            "0x710000102030: return void",
            "0x710000102030: finish",
        ]
    );
}

#[test]
fn referenced_types_imported_on_demand() {
    let mut types = TypeRegistry::new();
    types
        .add_struct("Actor", StructDef::new(4, 4, vec![MemberDef::new("hp", 0, BaseType::I32)]), None)
        .unwrap();
    let mut addrs = AddrRegistry::new(UPPER);
    addrs
        .add_data(INSTANCE, arg("sInstance", Some(TypeExpr::named("Actor").ptr())))
        .unwrap();

    // The type importer skips Actor because of the pattern; the data
    // symbol's reference still pulls it in, once.
    let options = ImportOptions {
        upper: UPPER,
        pattern: Some("Instance".to_string()),
        ..ImportOptions::default()
    };
    let mut fe = Recorder::new();
    tysync::run_import(&mut fe, &types, &addrs, &options).unwrap();
    assert_eq!(
        fe.calls,
        vec![
            "rename 0x710000200000 sInstance",
            "open data 0x710000200000 sInstance",
            "open struct Actor size=4 align=4",
            "Actor: alignment 4",
            "Actor: member 0 hp i32",
            "Actor: size 4",
            "Actor: finish",
            "0x710000200000: type %Actor*",
            "0x710000200000: finish",
        ]
    );
}

#[test]
fn type_only_skips_addresses() {
    let mut addrs = AddrRegistry::new(UPPER);
    addrs.add_function(UPDATE, FunctionDef::new("Actor_update", None, vec![])).unwrap();
    let mut fe = Recorder::new();
    run(&mut fe, &addrs, &ImportOptions { type_only: true, ..options() });
    assert!(fe.calls.is_empty(), "{:?}", fe.calls);
}

#[test]
fn pattern_filters_addresses() {
    let mut addrs = AddrRegistry::new(UPPER);
    addrs.add_function(UPDATE, FunctionDef::new("Actor_update", None, vec![])).unwrap();
    addrs.add_function(0x0010_2100, FunctionDef::new("Player_update", None, vec![])).unwrap();
    let mut fe = Recorder::new();
    run(
        &mut fe,
        &addrs,
        &ImportOptions {
            name_only: true,
            pattern: Some("Player".to_string()),
            ..options()
        },
    );
    assert_eq!(fe.calls, vec!["rename 0x710000102100 Player_update"]);
}
