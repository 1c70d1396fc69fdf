use apkmeta::{
    extract_file, Archive, Chunk, ChunkIterator, Configuration, ExtractOptions, LoadedStringPool,
    Metadata, MANIFEST_ENTRY, RESOURCES_ENTRY,
};
use clap::{value_t, App, Arg};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn field(bytes: &[u8], offset: usize) -> u32 {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .unwrap_or(0)
}

fn iterate(iter: ChunkIterator, depth: usize) {
    let indent = (0..depth * 4).map(|_| " ").collect::<String>();
    for chunk in iter {
        match chunk {
            Chunk::Table(b) => println!("{}Table packages={}", indent, field(b, 8)),
            Chunk::Package(b) => println!("{}Package id={:#04x}", indent, field(b, 8)),
            Chunk::StringPool(_) => match LoadedStringPool::from_chunk(&chunk) {
                Ok(sp) => println!(
                    "{}StringPool strings={} encoding={:?}",
                    indent,
                    sp.string_count(),
                    sp.encoding()
                ),
                Err(e) => println!("{}StringPool error: {}", indent, e),
            },
            Chunk::Spec(b) => println!(
                "{}Spec id={:#04x} entries={}",
                indent,
                field(b, 8) & 0xff,
                field(b, 12)
            ),
            Chunk::Type(b) => {
                let config = Configuration::parse(b, 20)
                    .map(|(c, _)| c.to_string())
                    .unwrap_or_else(|e| e.to_string());
                println!(
                    "{}Type id={:#04x} entries={} config={}",
                    indent,
                    field(b, 8) & 0xff,
                    field(b, 12),
                    config
                )
            }
            Chunk::Xml(_) => println!("{}Xml", indent),
            Chunk::XmlResourceMap(b) => {
                println!("{}ResourceMap ids={}", indent, b.len().saturating_sub(8) / 4)
            }
            Chunk::XmlStartNamespace(b) => {
                println!("{}StartNamespace line={}", indent, field(b, 8))
            }
            Chunk::XmlEndNamespace(b) => println!("{}EndNamespace line={}", indent, field(b, 8)),
            Chunk::XmlStartElement(b) => println!("{}StartElement line={}", indent, field(b, 8)),
            Chunk::XmlEndElement(b) => println!("{}EndElement line={}", indent, field(b, 8)),
            Chunk::XmlCdata(b) => println!("{}Cdata line={}", indent, field(b, 8)),
            Chunk::Unknown(type_, b) => {
                println!("{}Unknown type={:#06x} size={}", indent, type_, b.len())
            }
            Chunk::Error(ref msg) => println!("{}Error: {}", indent, msg),
        }
        if let Some(child_iter) = chunk.iter() {
            iterate(child_iter, depth + 1);
        }
    }
}

fn dump_chunks(apk: &str) -> apkmeta::Result<()> {
    let mut archive = Archive::open(apk)?;
    for name in &[RESOURCES_ENTRY, MANIFEST_ENTRY] {
        println!("{}:", name);
        match archive.read(name) {
            Ok(buf) => iterate(ChunkIterator::new(&buf), 1),
            Err(e) => println!("    {}", e),
        }
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Apply `f` to every item on at most `available_parallelism()` threads.
/// Results keep the order of `items`; items of a panicked worker are `None`.
fn map_bounded<T, R, F>(items: &[T], f: F) -> Vec<Option<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(items.len());
    let next = &AtomicUsize::new(0);
    let f = &f;
    let finished: Vec<(usize, R)> = thread::scope(|s| {
        let handles = (0..workers)
            .map(|_| {
                s.spawn(move || {
                    let mut finished = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let item = match items.get(index) {
                            Some(item) => item,
                            None => break,
                        };
                        finished.push((index, f(item)));
                    }
                    finished
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_default())
            .collect()
    });

    let mut results = (0..items.len()).map(|_| None).collect::<Vec<_>>();
    for (index, result) in finished {
        results[index] = Some(result);
    }
    results
}

fn extract_all(apks: &[&str], options: &ExtractOptions) -> Vec<Result<Metadata, String>> {
    map_bounded(apks, |apk| extract_file(apk, options).map_err(|e| e.to_string()))
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err("extraction panicked".to_owned())))
        .collect()
}

fn init_logging(verbosity: u64) {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let opts = App::new("apkmeta")
        .about("Print the metadata of Android packages as JSON")
        .arg(
            Arg::with_name("minimal")
                .long("minimal")
                .help("Skip permissions and meta-data"),
        )
        .arg(
            Arg::with_name("locale")
                .long("locale")
                .takes_value(true)
                .value_name("TAG")
                .default_value("zh-CN")
                .help("Locale of the localized name (NameCN)"),
        )
        .arg(
            Arg::with_name("chunks")
                .long("chunks")
                .help("Print the chunk tree of resources.arsc and AndroidManifest.xml"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Log more to stderr (-v debug, -vv trace)"),
        )
        .arg(
            Arg::with_name("apk")
                .takes_value(true)
                .required(true)
                .multiple(true),
        )
        .get_matches();
    init_logging(opts.occurrences_of("verbose"));

    let apks = opts.values_of("apk").map(|v| v.collect::<Vec<_>>()).unwrap_or_default();

    if opts.is_present("chunks") {
        let mut failed = false;
        for apk in &apks {
            if let Err(e) = dump_chunks(apk) {
                eprintln!("{}: {}", apk, e);
                failed = true;
            }
        }
        process::exit(if failed { 1 } else { 0 });
    }

    let locale = value_t!(opts.value_of("locale"), String).unwrap_or_else(|e| e.exit());
    let locale = Configuration::from_locale_tag(&locale).unwrap_or_else(|e| {
        eprintln!("--locale: {}", e);
        process::exit(2);
    });
    let options = ExtractOptions {
        full: !opts.is_present("minimal"),
        locale,
        ..ExtractOptions::default()
    };

    debug!("extracting {} archive(s) with {:?}", apks.len(), options);
    let results = extract_all(&apks, &options);

    let mut failed = false;
    for (apk, result) in apks.iter().zip(results) {
        match result.and_then(|m| to_json(&m).map_err(|e| e.to_string())) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{}: {}", apk, e);
                failed = true;
            }
        }
    }
    if failed {
        process::exit(1);
    }
}
