use kv3_reader::{BlockRange, DecodeOptions, Kv3Reader, Node, Value};
use std::env;

fn parse_number(flag: &str, raw: Option<&String>) -> u64 {
    let Some(raw) = raw else {
        eprintln!("ERROR: {} flag requires an argument.", flag);
        std::process::exit(1);
    };
    let parsed = match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.unwrap_or_else(|_| {
        eprintln!("ERROR: Invalid value for {}: {}", flag, raw);
        std::process::exit(1);
    })
}

fn describe(node: &Node) -> String {
    match &node.value {
        Value::Object(object) => format!("object ({} members)", object.len()),
        Value::Array(items) => format!("array ({} items)", items.len()),
        other => format!("{:?}", other),
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "Usage: {} <resource-file> [--offset N] [--length N] [--max-depth N] [--max-values N] [--json]",
            args[0]
        );
        std::process::exit(1);
    }

    let path = &args[1];
    let flag_value = |flag: &str| {
        args.iter()
            .position(|arg| arg == flag)
            .map(|idx| parse_number(flag, args.get(idx + 1)))
    };
    let offset = flag_value("--offset").unwrap_or(0);
    let length = flag_value("--length");
    let mut options = DecodeOptions::default();
    if let Some(depth) = flag_value("--max-depth") {
        options = options.with_max_depth(depth as usize);
    }
    if let Some(limit) = flag_value("--max-values") {
        options = options.with_max_values(limit as usize);
    }
    let as_json = args.iter().any(|arg| arg == "--json");

    let reader = match Kv3Reader::open(path, options) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("ERROR: Failed to open {}", path);
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };
    let length = length.unwrap_or_else(|| reader.file_len().saturating_sub(offset));
    let range = BlockRange::new(offset, length);

    match reader.read_block(range) {
        Ok(doc) if as_json => match serde_json::to_string_pretty(&doc.root) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("ERROR: Failed to render JSON: {}", e);
                std::process::exit(1);
            }
        },
        Ok(doc) => {
            println!("Block {} of {}", range, path);
            println!("{}", "=".repeat(60));
            println!("  Revision: {}", doc.revision);
            println!("  Strings: {}", doc.strings.len());
            println!("  Root: {}", describe(&doc.root));

            if let Some(object) = doc.root.as_object() {
                println!("\nTop-level members:");
                for (name, node) in object.iter().take(20) {
                    println!("  {} = {}", name, describe(node));
                }
                if object.len() > 20 {
                    println!("  ... and {} more", object.len() - 20);
                }
            }
        }
        Err(e) => {
            eprintln!("\nERROR: Failed to decode KV3 block {}", range);
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
