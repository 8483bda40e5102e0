//! `apkres` command line: decode manifests, binary XML, resource tables
//! and nine-patch chunks, or compile text XML.

use std::fs;
use std::io::Write;
use std::process::ExitCode;

use log::{error, info, LevelFilter, Log, Metadata, Record};

use apkres::{create_cursor, decode_manifest, decode_xml, dump_table};
use apkres::arsc_writer::publicize_table;
use apkres::axml_writer::AXmlWriter;
use apkres::cli::{self, ArgType, Args};
use apkres::error::Result;
use apkres::ninepatch::{NinePatchData, OpticalInset};
use apkres::res_table::{ARSCData, DecodeOptions};
use apkres::serializer::SerializerOptions;

/// Minimal `log` backend: diagnostics go to stderr, one line per record.
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}: {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn level_filter(verbose: bool) -> LevelFilter {
    if verbose { LevelFilter::Debug } else { LevelFilter::Warn }
}

fn init_logger(verbose: bool) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level_filter(verbose));
    }
}

fn emit(args: &Args, contents: &[u8]) -> Result<()> {
    match &args.output {
        Some(path) => {
            fs::write(path, contents)?;
            info!("Wrote {} bytes to {}", contents.len(), path);
        },
        None => {
            let mut stdout = std::io::stdout();
            stdout.write_all(contents)?;
            stdout.flush()?;
        },
    }

    Ok(())
}

fn emit_text(args: &Args, text: &str) -> Result<()> {
    emit(args, format!("{}\n", text).as_bytes())
}

fn load_table(path: &str, options: &DecodeOptions) -> Result<ARSCData> {
    ARSCData::from_bytes(&fs::read(path)?, options)
}

fn run(args: &Args) -> Result<()> {
    let arg_type = args.get_arg_type();
    let arg_path = args.get_arg_path();

    let serializer_options = SerializerOptions {
        line_alignment: !args.no_line_opt,
        ..Default::default()
    };
    let decode_options = DecodeOptions {
        keep_broken: args.keep_broken,
        ..Default::default()
    };

    match arg_type {
        ArgType::Apk => {
            let text = decode_manifest(arg_path, serializer_options)?;
            emit_text(args, &text)
        },
        ArgType::Axml => {
            let axml_buff = create_cursor(&arg_type, arg_path)?;
            let table = match &args.table {
                Some(path) => Some(load_table(path, &decode_options)?),
                None => None,
            };
            let text = decode_xml(axml_buff.get_ref(), table.as_ref(), serializer_options)?;
            emit_text(args, &text)
        },
        ArgType::Arsc => {
            let mut bytes = create_cursor(&arg_type, arg_path)?.into_inner();
            if args.publicize {
                publicize_table(&mut bytes)?;
                return emit(args, &bytes);
            }

            let data = ARSCData::from_bytes(&bytes, &decode_options)?;
            let mut listing = Vec::new();
            dump_table(&data, &mut listing)?;
            emit(args, &listing)
        },
        ArgType::NinePatch => {
            let png = create_cursor(&arg_type, arg_path)?.into_inner();
            let np = NinePatchData::from_png(&png)?;
            let mut text = format!(
                "padding: left={} right={} top={} bottom={}\nx divs: {:?}\ny divs: {:?}",
                np.padding_left, np.padding_right, np.padding_top, np.padding_bottom,
                np.x_divs, np.y_divs);
            if let Ok(inset) = OpticalInset::from_png(&png) {
                text.push_str(&format!(
                    "\nlayout bounds: left={} top={} right={} bottom={}",
                    inset.layout_bounds_left, inset.layout_bounds_top,
                    inset.layout_bounds_right, inset.layout_bounds_bottom));
            }
            emit_text(args, &text)
        },
        ArgType::Text => {
            let text = fs::read_to_string(arg_path)?;
            let mut writer = AXmlWriter::new();
            if let Some(path) = &args.table {
                writer = writer.map_table_attributes(&load_table(path, &decode_options)?);
            }
            emit(args, &writer.encode(&text)?)
        },
    }
}

fn main() -> ExitCode {
    let args = cli::parse_args();
    init_logger(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        },
    }
}
