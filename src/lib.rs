pub mod cli;
pub mod error;
pub mod chunk_type;
pub mod chunk_header;
pub mod string_pool;
pub mod namespace_stack;
pub mod data_value_type;
pub mod res_value;
pub mod res_config;
pub mod res_package;
pub mod res_attr;
pub mod res_table;
pub mod arsc_writer;
pub mod resource_map;
pub mod res_xml_encoders;
pub mod serializer;
pub mod parser;
pub mod axml_writer;
pub mod ninepatch;

use std::fs;
use std::io::{
    Read,
    Write,
    Cursor,
};
use log::{debug, info};
use zip::result::ZipError;

use crate::cli::ArgType;
use crate::error::Result;
use crate::parser::XmlStreamDecoder;
use crate::res_attr::{NoResolver, ResourceResolver, resolve_reference};
use crate::res_package::EntryValue;
use crate::res_table::{ARSCData, DecodeOptions};
use crate::res_value::ResValue;
use crate::serializer::SerializerOptions;

pub const MANIFEST_ENTRY: &str = "AndroidManifest.xml";
pub const RESOURCES_ENTRY: &str = "resources.arsc";

/// Read one entry of an APK.
pub fn read_apk_entry(apk_path: &str, entry_name: &str) -> Result<Vec<u8>> {
    let zipfile = fs::File::open(apk_path)?;
    let mut archive = zip::ZipArchive::new(zipfile)?;
    let mut raw_file = archive.by_name(entry_name)?;

    let mut contents = Vec::new();
    raw_file.read_to_end(&mut contents)?;
    debug!("Read {} bytes from {}!{}", contents.len(), apk_path, entry_name);

    Ok(contents)
}

/// Open the file, read the contents, and create a `Cursor` of the raw data.
/// For an APK the cursor holds the binary manifest.
pub fn create_cursor(arg_type: &ArgType, file_path: &str) -> Result<Cursor<Vec<u8>>> {
    let contents = if *arg_type == ArgType::Apk {
        read_apk_entry(file_path, MANIFEST_ENTRY)?
    } else {
        fs::read(file_path)?
    };

    Ok(Cursor::new(contents))
}

/// Decode a binary XML document to text. References and enum/flag values
/// are named when a resource table is given.
pub fn decode_xml(axml: &[u8], table: Option<&ARSCData>, options: SerializerOptions) -> Result<String> {
    let resolver: &dyn ResourceResolver = match table {
        Some(table) => table,
        None => &NoResolver,
    };

    XmlStreamDecoder::new(resolver, options).decode_to_string(axml)
}

/// Decode the manifest of an APK, naming resources through the APK's own
/// `resources.arsc` when it has one.
pub fn decode_manifest(apk_path: &str, options: SerializerOptions) -> Result<String> {
    let manifest = read_apk_entry(apk_path, MANIFEST_ENTRY)?;

    let table = match read_apk_entry(apk_path, RESOURCES_ENTRY) {
        Ok(bytes) => Some(ARSCData::from_bytes(&bytes, &DecodeOptions::default())?),
        Err(error::Error::Zip(ZipError::FileNotFound)) => {
            info!("No {} in {}, references stay numeric", RESOURCES_ENTRY, apk_path);
            None
        },
        Err(e) => return Err(e),
    };

    decode_xml(&manifest, table.as_ref(), options)
}

/// Text form of a table value.
pub fn render_value(data: &ARSCData, value: &ResValue) -> String {
    if value.is_string() {
        return data.value_string(value.data).unwrap_or_default();
    }

    resolve_reference(value, data)
        .or_else(|| value.coerce_to_string())
        .unwrap_or_else(|| format!("0x{:08x}", value.data))
}

/// Human readable listing of every package, spec and value of a table.
pub fn dump_table<W: Write>(data: &ARSCData, out: &mut W) -> Result<()> {
    for package in data.packages.iter() {
        writeln!(out, "Package 0x{:02x} {} ({} specs)",
                 package.id, package.name, package.get_res_spec_count())?;

        for library in package.libraries.iter() {
            writeln!(out, "  library 0x{:02x} {}", library.package_id, library.package_name)?;
        }

        for spec in package.specs() {
            writeln!(out, "  {} {}", spec.id, spec.full_name())?;

            let type_spec = match package.type_spec(spec.id.type_id()) {
                Some(type_spec) => type_spec,
                None => continue,
            };
            for res_type in type_spec.types.iter() {
                let entry = match res_type.entry(spec.id.entry_id()) {
                    Some(entry) => entry,
                    None => continue,
                };
                match &entry.value {
                    EntryValue::Scalar(value) => {
                        writeln!(out, "    {} = {}", res_type.config, render_value(data, value))?;
                    },
                    EntryValue::Bag(bag) => {
                        writeln!(out, "    {} = bag ({} items)", res_type.config, bag.items.len())?;
                        for (key, value) in bag.items.iter() {
                            let key = data.reference_name(*key).unwrap_or_else(|| key.to_string());
                            writeln!(out, "      {} = {}", key, render_value(data, value))?;
                        }
                    },
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arsc_writer::ARSCWriter;
    use crate::data_value_type::DataValueType;
    use crate::res_config::ResConfig;
    use crate::res_package::{ResEntry, ResId, ResPackage, ResTypeSpec};
    use crate::string_pool::StringPool;

    #[test]
    fn dumps_packages_and_values() {
        let mut package = ResPackage::new(0x7f, "com.example");
        package.type_strings.push("color");
        package.key_strings.push("accent");
        package.type_specs.push(ResTypeSpec::new(1, "color", 1));
        let id = ResId::new(0x7f, 1, 0);
        package.add_spec(id, "accent");
        package.add_entry(id, &ResConfig::default(), ResEntry {
            flags: 0,
            key: 0,
            value: EntryValue::Scalar(ResValue::new(DataValueType::TypeIntColorRgb8, 0xFF33_6699)),
        }, false).unwrap();

        let data = ARSCData::new(StringPool::default(), vec![package]);
        let bytes = ARSCWriter::new(&data).write().unwrap();
        let data = ARSCData::from_bytes(&bytes, &DecodeOptions::default()).unwrap();

        let mut out = Vec::new();
        dump_table(&data, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), concat!(
            "Package 0x7f com.example (1 specs)\n",
            "  0x7f010000 color/accent\n",
            "    [DEFAULT] = #336699\n"));
    }
}
