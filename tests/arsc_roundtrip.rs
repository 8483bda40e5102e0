use apkres::arsc_writer::{publicize_table, ARSCWriter};
use apkres::data_value_type::DataValueType;
use apkres::res_attr::ResourceResolver;
use apkres::res_config::ResConfig;
use apkres::res_package::{
    EntryValue,
    ResEntry,
    ResId,
    ResPackage,
    ResTypeSpec,
    SPEC_PUBLIC,
};
use apkres::res_table::{ARSCData, DecodeOptions};
use apkres::res_value::ResValue;
use apkres::string_pool::StringPool;
use apkres::render_value;

fn scalar(key: u32, value: ResValue) -> ResEntry {
    ResEntry {
        flags: 0,
        key,
        value: EntryValue::Scalar(value),
    }
}

/// Package with one type holding `names`, entry `i` keyed by name `i`.
/// Names given as `None` leave a hole in the type chunk.
fn package(id: u32, name: &str, type_name: &str, names: &[Option<&str>]) -> ResPackage {
    let mut package = ResPackage::new(id, name);
    package.type_strings.push(type_name);
    package.type_specs.push(ResTypeSpec::new(1, type_name, names.len()));

    for (index, entry_name) in names.iter().enumerate() {
        let entry_name = match entry_name {
            Some(entry_name) => entry_name,
            None => continue,
        };
        let key = package.key_strings.push(entry_name);
        let res_id = ResId::new(id as u8, 1, index as u16);
        package.add_spec(res_id, entry_name);
        package.add_entry(res_id, &ResConfig::default(),
                          scalar(key, ResValue::new(DataValueType::TypeIntDec, index as u32)),
                          false).unwrap();
    }

    package
}

fn write(data: &ARSCData) -> Vec<u8> {
    ARSCWriter::new(data).write().unwrap()
}

fn decode(bytes: &[u8], options: &DecodeOptions) -> ARSCData {
    ARSCData::from_bytes(bytes, options).unwrap()
}

fn table(packages: Vec<ResPackage>) -> ARSCData {
    let mut strings = StringPool::default();
    strings.push("hello");

    ARSCData::new(strings, packages)
}

#[test]
fn rewriting_a_decoded_table_is_stable() {
    let mut main = package(0x7f, "com.example", "string", &[Some("title"), Some("body")]);
    let title = ResId(0x7f01_0000);
    let land = ResConfig::default().with_orientation(2);
    main.add_entry(title, &land, scalar(0, ResValue::string(0)), false).unwrap();

    let bytes = write(&table(vec![main]));
    let decoded = decode(&bytes, &DecodeOptions::default());
    assert_eq!(write(&decoded), bytes);

    let package = decoded.get_one_package().unwrap();
    assert_eq!(package.name, "com.example");
    assert_eq!(package.spec(title).map(|s| s.full_name()), Some("string/title".to_string()));

    let spec = package.type_spec(1).unwrap();
    assert_eq!(spec.types.len(), 2);
    let landscape = package.entry(title, &land).and_then(|e| e.scalar()).unwrap();
    assert_eq!(render_value(&decoded, landscape), "hello");
}

#[test]
fn publicize_marks_every_spec() {
    let mut bytes = write(&table(vec![
        package(0x7f, "com.example", "string", &[Some("a"), Some("b"), Some("c")]),
    ]));
    let before = decode(&bytes, &DecodeOptions::default());
    assert_eq!(before.flags_offsets.len(), 1);
    assert_eq!(before.flags_offsets[0].count, 3);
    assert!(before.packages[0].type_specs[0].flags.iter().all(|f| f & SPEC_PUBLIC == 0));

    publicize_table(&mut bytes).unwrap();
    let after = decode(&bytes, &DecodeOptions::default());
    assert!(after.packages[0].type_specs[0].flags.iter().all(|f| f & SPEC_PUBLIC != 0));
    assert_eq!(after.packages[0].get_res_spec_count(), 3);
}

#[test]
fn holes_get_dummy_specs_on_request() {
    let bytes = write(&table(vec![
        package(0x7f, "com.example", "string", &[Some("first"), None, Some("third")]),
    ]));
    let hole = ResId(0x7f01_0001);

    let plain = decode(&bytes, &DecodeOptions::default());
    assert!(!plain.packages[0].has_spec(hole));

    let options = DecodeOptions {
        add_dummy_specs: true,
        ..Default::default()
    };
    let with_dummies = decode(&bytes, &options);
    let package = &with_dummies.packages[0];
    assert_eq!(package.spec(hole).map(|s| s.name.as_str()), Some("APKTOOL_DUMMY_1"));
    let value = package.any_entry(hole).and_then(|e| e.scalar()).unwrap();
    assert!(value.is_reference());
    assert_eq!(value.data, 0);
}

#[test]
fn main_package_has_most_specs() {
    let bytes = write(&table(vec![
        package(0x01, "android", "attr", &[Some("orientation")]),
        package(0x7f, "com.example", "id", &[Some("a"), Some("b")]),
    ]));
    let data = decode(&bytes, &DecodeOptions::default());

    assert_eq!(data.find_package_with_most_res_specs(), Some(1));
    assert_eq!(data.get_one_package().unwrap().name, "com.example");
    assert_eq!(data.reference_name(ResId(0x7f01_0001)).as_deref(), Some("id/b"));
    assert_eq!(data.reference_name(ResId(0x0101_0000)).as_deref(), Some("android:attr/orientation"));
    assert_eq!(data.spec_name(ResId(0x0101_0000)).as_deref(), Some("orientation"));
}
