//! Dump/load round trips and project-level failure modes.

#![allow(clippy::pedantic, clippy::nursery, clippy::too_many_lines)]

use std::fs;
use std::path::{Path, PathBuf};

use hasm_core::{
    dump_project, load_project, AlwaysOverwrite, ErrorClass, Function, Instruction, Metadata,
    MemoryModule, ModuleAccessor, NeverOverwrite, Operand, OperandKind, OperandValue,
    ParseError, ParseErrorKind, ProjectError, StringEntry, StringRecord, StringTableError,
    INSTRUCTIONS_FILE, METADATA_FILE, STRINGS_FILE,
};
use log as _;
use proptest::prelude::*;
use rstest::rstest;
use serde as _;
use serde_json::json;
use thiserror as _;

fn sample_module() -> MemoryModule {
    MemoryModule::new(
        vec![
            Function {
                name: "global".into(),
                param_count: 1,
                register_count: 3,
                symbol_count: 0,
                instructions: vec![
                    Instruction::new(
                        "LoadConstString",
                        vec![
                            Operand::integer(OperandKind::Reg8, 0),
                            Operand::integer(OperandKind::UInt16S, 0),
                        ],
                    ),
                    Instruction::new(
                        "LoadConstDouble",
                        vec![Operand::integer(OperandKind::Reg8, 1), Operand::real(3.14)],
                    ),
                    Instruction::new(
                        "Jmp",
                        vec![Operand::integer(OperandKind::Addr8, -6)],
                    ),
                    Instruction::new("Ret", vec![Operand::integer(OperandKind::Reg8, 0)]),
                ],
            },
            Function {
                name: "helper".into(),
                param_count: 2,
                register_count: 5,
                symbol_count: 1,
                instructions: vec![
                    Instruction::new(
                        "GetById",
                        vec![
                            Operand::integer(OperandKind::Reg8, 2),
                            Operand::integer(OperandKind::Reg8, 1),
                            Operand::integer(OperandKind::UInt8, 1),
                            Operand::integer(OperandKind::UInt32S, 2),
                        ],
                    ),
                    Instruction::new("LoadConstZero", vec![Operand::integer(OperandKind::Reg8, 0)]),
                    Instruction::new("Ret", vec![Operand::integer(OperandKind::Reg8, 0)]),
                ],
            },
        ],
        vec![
            StringEntry::narrow("hello"),
            StringEntry::narrow("never referenced"),
            StringEntry::wide("длина"),
        ],
    )
}

fn project_dir(temp: &tempfile::TempDir) -> PathBuf {
    temp.path().join("project")
}

fn dumped() -> (tempfile::TempDir, PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let dir = project_dir(&temp);
    dump_project(&sample_module(), &dir, &mut AlwaysOverwrite).unwrap();
    (temp, dir)
}

fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let path = entry.unwrap().path();
            let bytes = fs::read(&path).unwrap();
            (path, bytes)
        })
        .collect();
    entries.sort();
    entries
}

#[test]
fn round_trip_restores_module() {
    let (_temp, dir) = dumped();
    let loaded: MemoryModule = load_project(&dir).unwrap();
    assert_eq!(loaded, sample_module());
}

#[test]
fn round_trip_preserves_real_operand_bits() {
    let (_temp, dir) = dumped();
    let loaded: MemoryModule = load_project(&dir).unwrap();
    let operand = loaded.function(0).unwrap().instructions[1].operands[1];
    assert_eq!(operand.value, OperandValue::Real(3.14));
}

#[test]
fn dump_writes_three_artifacts() {
    let (_temp, dir) = dumped();
    let names: Vec<_> = snapshot(&dir)
        .into_iter()
        .map(|(path, _)| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![INSTRUCTIONS_FILE, METADATA_FILE, STRINGS_FILE]);
}

#[test]
fn string_artifact_is_exhaustive() {
    let (_temp, dir) = dumped();
    let records: Vec<StringRecord> =
        serde_json::from_str(&fs::read_to_string(dir.join(STRINGS_FILE)).unwrap()).unwrap();
    let ids: Vec<_> = records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert!(records[2].is_wide);
    assert_eq!(records[1].value, "never referenced");
}

#[test]
fn load_rejects_string_artifact_missing_an_id() {
    let (_temp, dir) = dumped();
    let path = dir.join(STRINGS_FILE);
    let mut records: Vec<StringRecord> =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    records.remove(1);
    fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

    let err = load_project::<MemoryModule>(&dir).unwrap_err();
    assert!(matches!(
        err,
        ProjectError::StringTable(StringTableError::Missing { id: 1 })
    ));
    assert_eq!(err.class(), ErrorClass::Malformed);
}

#[test]
fn string_records_may_be_reordered() {
    let (_temp, dir) = dumped();
    let path = dir.join(STRINGS_FILE);
    let mut records: Vec<StringRecord> =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    records.reverse();
    fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

    let loaded: MemoryModule = load_project(&dir).unwrap();
    assert_eq!(loaded, sample_module());
}

#[test]
fn comment_lines_do_not_affect_instructions() {
    let (_temp, dir) = dumped();
    let path = dir.join(INSTRUCTIONS_FILE);
    let original = fs::read_to_string(&path).unwrap();
    assert!(original.contains("\t; Oper[1]: String(0) \"hello\"\n"));

    let edited = original.replace("\t; Oper[1]: String(0) \"hello\"\n", "\t; rewritten by hand\n");
    fs::write(&path, &edited).unwrap();
    let loaded: MemoryModule = load_project(&dir).unwrap();
    assert_eq!(loaded, sample_module());

    let stripped: String = original
        .lines()
        .filter(|line| !line.trim_start().starts_with(';'))
        .map(|line| format!("{line}\n"))
        .collect();
    fs::write(&path, stripped).unwrap();
    let loaded: MemoryModule = load_project(&dir).unwrap();
    assert_eq!(loaded, sample_module());
}

#[test]
fn blocks_in_any_order_are_placed_by_index() {
    let temp = tempfile::tempdir().unwrap();
    let dir = project_dir(&temp);
    fs::create_dir(&dir).unwrap();
    fs::write(
        dir.join(METADATA_FILE),
        r#"{"header":{"functionCount":2,"stringCount":0}}"#,
    )
    .unwrap();
    fs::write(dir.join(STRINGS_FILE), "[]").unwrap();
    fs::write(
        dir.join(INSTRUCTIONS_FILE),
        "\
Function<one>1(0 params, 2 registers, 0 symbols):
\tMov                 \tReg8:1, Reg8:0
EndFunction

Function<zero>0(1 params, 1 registers, 0 symbols):
\tRet                 \tReg8:0
EndFunction

",
    )
    .unwrap();

    let loaded: MemoryModule = load_project(&dir).unwrap();
    assert_eq!(loaded.function_count(), 2);
    let zero = loaded.function(0).unwrap();
    let one = loaded.function(1).unwrap();
    assert_eq!(zero.name, "zero");
    assert_eq!(zero.instructions[0].opcode, "Ret");
    assert_eq!(one.name, "one");
    assert_eq!(one.register_count, 2);
    assert_eq!(one.instructions[0].opcode, "Mov");
}

#[test]
fn header_index_at_function_count_is_out_of_range() {
    let temp = tempfile::tempdir().unwrap();
    let dir = project_dir(&temp);
    fs::create_dir(&dir).unwrap();
    fs::write(
        dir.join(METADATA_FILE),
        r#"{"header":{"functionCount":1,"stringCount":0}}"#,
    )
    .unwrap();
    fs::write(dir.join(STRINGS_FILE), "[]").unwrap();
    fs::write(
        dir.join(INSTRUCTIONS_FILE),
        "Function<f>1(0 params, 0 registers, 0 symbols):\nEndFunction\n\n",
    )
    .unwrap();

    let err = load_project::<MemoryModule>(&dir).unwrap_err();
    assert!(matches!(
        err,
        ProjectError::Parse(ParseError {
            kind: ParseErrorKind::OutOfRangeIndex {
                index: 1,
                function_count: 1
            },
            ..
        })
    ));
}

#[test]
fn function_count_comes_from_metadata() {
    let (_temp, dir) = dumped();
    let path = dir.join(METADATA_FILE);
    fs::write(&path, r#"{"header":{"functionCount":3,"stringCount":3}}"#).unwrap();

    let err = load_project::<MemoryModule>(&dir).unwrap_err();
    assert!(matches!(
        err,
        ProjectError::Parse(ParseError {
            kind: ParseErrorKind::MissingFunction { index: 2 },
            ..
        })
    ));
}

#[test]
fn bogus_operand_kind_fails_load() {
    let (_temp, dir) = dumped();
    let path = dir.join(INSTRUCTIONS_FILE);
    let text = fs::read_to_string(&path).unwrap().replace("Addr8:-6", "Bogus:1");
    fs::write(&path, text).unwrap();

    let err = load_project::<MemoryModule>(&dir).unwrap_err();
    assert!(matches!(
        err,
        ProjectError::Parse(ParseError {
            kind: ParseErrorKind::MalformedOperand { function: 0, .. },
            ..
        })
    ));
}

#[rstest]
#[case(METADATA_FILE)]
#[case(STRINGS_FILE)]
#[case(INSTRUCTIONS_FILE)]
fn missing_artifact_fails_fast(#[case] name: &str) {
    let (_temp, dir) = dumped();
    fs::remove_file(dir.join(name)).unwrap();

    let err = load_project::<MemoryModule>(&dir).unwrap_err();
    match err {
        ProjectError::MissingArtifact { path } => assert_eq!(path, dir.join(name)),
        other => panic!("expected MissingArtifact, got {other:?}"),
    }
}

#[test]
fn declined_overwrite_leaves_directory_untouched() {
    let temp = tempfile::tempdir().unwrap();
    let dir = project_dir(&temp);
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("notes.txt"), b"hand-written notes").unwrap();
    fs::write(dir.join(INSTRUCTIONS_FILE), b"stale").unwrap();
    let before = snapshot(&dir);

    let err = dump_project(&sample_module(), &dir, &mut NeverOverwrite).unwrap_err();
    assert!(matches!(
        err,
        ProjectError::DestructiveOverwriteDeclined { ref path } if path == &dir
    ));
    assert_eq!(err.class(), ErrorClass::Declined);
    assert_eq!(snapshot(&dir), before);
}

#[test]
fn confirmed_overwrite_clears_stale_content() {
    let temp = tempfile::tempdir().unwrap();
    let dir = project_dir(&temp);
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("stale.hasm"), b"old").unwrap();

    let mut asked = 0;
    let mut policy = |_: &Path| {
        asked += 1;
        true
    };
    dump_project(&sample_module(), &dir, &mut policy).unwrap();
    assert_eq!(asked, 1);
    assert!(!dir.join("stale.hasm").exists());
    assert_eq!(snapshot(&dir).len(), 3);
}

#[test]
fn fresh_location_is_not_confirmed() {
    let temp = tempfile::tempdir().unwrap();
    let dir = project_dir(&temp);
    dump_project(&sample_module(), &dir, &mut NeverOverwrite).unwrap();
    assert_eq!(snapshot(&dir).len(), 3);
}

#[test]
fn unrenderable_module_writes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let dir = project_dir(&temp);
    let module = MemoryModule::new(
        vec![Function {
            instructions: vec![Instruction::new(
                "LoadConstString",
                vec![Operand::integer(OperandKind::UInt32S, 4)],
            )],
            ..Function::default()
        }],
        vec![],
    );

    let err = dump_project(&module, &dir, &mut AlwaysOverwrite).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Backend);
    assert!(!dir.exists());
}

#[test]
fn metadata_passes_through_unchanged() {
    let temp = tempfile::tempdir().unwrap();
    let dir = project_dir(&temp);
    let metadata = Metadata::new(json!({
        "zeta": { "nested": [1, 2.5, "x"] },
        "header": { "version": 84, "functionCount": 0, "stringCount": 0 },
        "alpha": null
    }));
    let module = MemoryModule::with_metadata(metadata.clone(), vec![], vec![]).unwrap();

    dump_project(&module, &dir, &mut AlwaysOverwrite).unwrap();
    let text = fs::read_to_string(dir.join(METADATA_FILE)).unwrap();
    assert_eq!(text, serde_json::to_string(&metadata).unwrap());
    assert!(text.find("zeta") < text.find("alpha"));

    let loaded: MemoryModule = load_project(&dir).unwrap();
    assert_eq!(loaded.metadata(), &metadata);
}

#[test]
fn metadata_numbers_keep_their_text() {
    let (_temp, dir) = dumped();
    let raw = r#"{"header":{"functionCount":2,"stringCount":3},"big":123456789012345678901234567890,"sci":1e2}"#;
    fs::write(dir.join(METADATA_FILE), raw).unwrap();

    let loaded: MemoryModule = load_project(&dir).unwrap();
    let again = tempfile::tempdir().unwrap();
    let out = project_dir(&again);
    dump_project(&loaded, &out, &mut AlwaysOverwrite).unwrap();
    assert_eq!(fs::read_to_string(out.join(METADATA_FILE)).unwrap(), raw);
}

#[test]
fn oversized_function_count_fails_cleanly() {
    let (_temp, dir) = dumped();
    fs::write(
        dir.join(METADATA_FILE),
        r#"{"header":{"functionCount":1000000000000000,"stringCount":3}}"#,
    )
    .unwrap();

    let err = load_project::<MemoryModule>(&dir).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Backend);
    assert!(err.to_string().contains("functionCount"), "{err}");
}

fn operand_strategy(string_count: usize) -> BoxedStrategy<Operand> {
    let mut choices = vec![
        (0i64..=255)
            .prop_map(|v| Operand::integer(OperandKind::Reg8, v))
            .boxed(),
        any::<u32>()
            .prop_map(|v| Operand::integer(OperandKind::Reg32, i64::from(v)))
            .boxed(),
        any::<u32>()
            .prop_map(|v| Operand::integer(OperandKind::Reg, i64::from(v)))
            .boxed(),
        any::<i32>()
            .prop_map(|v| Operand::integer(OperandKind::Imm32, i64::from(v)))
            .boxed(),
        any::<i8>()
            .prop_map(|v| Operand::integer(OperandKind::Addr8, i64::from(v)))
            .boxed(),
        any::<u16>()
            .prop_map(|v| Operand::integer(OperandKind::UInt16, i64::from(v)))
            .boxed(),
        (-1.0e12f64..1.0e12).prop_map(Operand::real).boxed(),
    ];
    if string_count > 0 {
        choices.push(
            (0..string_count)
                .prop_map(|id| Operand::integer(OperandKind::UInt32S, i64::try_from(id).unwrap()))
                .boxed(),
        );
    }
    proptest::strategy::Union::new(choices).boxed()
}

fn instruction_strategy(string_count: usize) -> impl Strategy<Value = Instruction> {
    (
        "[A-Z][a-zA-Z]{0,8}",
        prop::collection::vec(operand_strategy(string_count), 0..4),
    )
        .prop_map(|(opcode, operands)| Instruction::new(opcode, operands))
}

fn function_strategy(string_count: usize) -> impl Strategy<Value = Function> {
    (
        "[a-z<>_ ]{0,8}",
        0u32..8,
        0u32..256,
        0u32..4,
        prop::collection::vec(instruction_strategy(string_count), 0..6),
    )
        .prop_map(
            |(name, param_count, register_count, symbol_count, instructions)| Function {
                name,
                param_count,
                register_count,
                symbol_count,
                instructions,
            },
        )
}

fn module_strategy() -> impl Strategy<Value = MemoryModule> {
    prop::collection::vec(("[ -~\n\t\u{e9}\u{4e2d}]{0,12}", any::<bool>()), 0..4)
        .prop_flat_map(|strings| {
            let functions = prop::collection::vec(function_strategy(strings.len()), 0..4);
            (Just(strings), functions)
        })
        .prop_map(|(strings, functions)| {
            let strings = strings
                .into_iter()
                .map(|(value, is_wide)| StringEntry { value, is_wide })
                .collect();
            MemoryModule::new(functions, strings)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn property_dump_then_load_is_identity(module in module_strategy()) {
        let temp = tempfile::tempdir().unwrap();
        let dir = project_dir(&temp);
        dump_project(&module, &dir, &mut AlwaysOverwrite).unwrap();
        let loaded: MemoryModule = load_project(&dir).unwrap();
        prop_assert_eq!(loaded, module);
    }
}
