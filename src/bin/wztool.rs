//! Archive inspection utility.
//!
//! Provides four subcommands:
//! - `info`: print header details of an archive (layout, version, shards).
//! - `tree`: list the node tree to a given depth.
//! - `dump`: dump a property subtree as JSON.
//! - `export`: decode a canvas node and write it as a PNG.
//!
//! All subcommands are strictly read-only.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::info;
use maplet_rs::prelude::*;

fn main() -> Result<()> {
	env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
	let cli = Cli::parse();
	match cli.command {
		Command::Info(opts) => run_info(&opts),
		Command::Tree(opts) => run_tree(&opts),
		Command::Dump(opts) => run_dump(&opts),
		Command::Export(opts) => run_export(&opts),
	}
}

#[derive(Parser)]
#[command(name = "wztool")]
#[command(author = "maplet-rs project")]
#[command(version)]
#[command(about = "Inspect packaged asset archives", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Print archive header details
	Info(ArchiveArgs),
	/// List the node tree
	Tree(TreeArgs),
	/// Dump a property subtree as JSON
	Dump(DumpArgs),
	/// Export a canvas node as PNG
	Export(ExportArgs),
}

#[derive(Args)]
struct ArchiveArgs {
	/// Archive file (.wz) or package directory
	archive: PathBuf,

	/// Region IV as eight hex digits (e.g. 4D23C72B)
	#[arg(long, value_name = "HEX")]
	iv: Option<String>,
}

impl ArchiveArgs {
	fn open(&self) -> Result<Source> {
		let name = self
			.archive
			.file_stem()
			.map(|stem| stem.to_string_lossy().into_owned())
			.unwrap_or_default();
		let mut options = SourceOptions::default();
		if let Some(iv_hex) = &self.iv {
			let bytes = hex::decode(iv_hex).context("IV is not valid hex")?;
			let Ok(iv) = <[u8; 4]>::try_from(bytes.as_slice()) else {
				bail!("IV must be exactly 4 bytes");
			};
			options.iv = iv;
		}
		Source::open(&self.archive, &name, options)
			.with_context(|| format!("cannot open '{}'", self.archive.display()))
	}
}

#[derive(Args)]
struct TreeArgs {
	#[command(flatten)]
	archive: ArchiveArgs,

	/// Start path inside the archive (defaults to the root)
	#[arg(short, long, value_name = "PATH")]
	path: Option<String>,

	/// Maximum depth to descend
	#[arg(short, long, default_value_t = 2)]
	depth: usize,
}

#[derive(Args)]
struct DumpArgs {
	#[command(flatten)]
	archive: ArchiveArgs,

	/// Property path inside the archive
	#[arg(short, long, value_name = "PATH")]
	path: String,

	/// Pretty-print the JSON output
	#[arg(long, default_value_t = false)]
	pretty: bool,
}

#[derive(Args)]
struct ExportArgs {
	#[command(flatten)]
	archive: ArchiveArgs,

	/// Path of the canvas node inside the archive
	#[arg(short, long, value_name = "PATH")]
	path: String,

	/// Output PNG file
	#[arg(short, long, value_name = "FILE")]
	out: PathBuf,
}

fn run_info(opts: &ArchiveArgs) -> Result<()> {
	let source = opts.open()?;
	let json = serde_json::to_string_pretty(&source.info())?;
	println!("{json}");
	Ok(())
}

fn run_tree(opts: &TreeArgs) -> Result<()> {
	let source = opts.archive.open()?;
	let start = resolve(&source, opts.path.as_deref().unwrap_or(""))?;
	print_tree(&start, 0, opts.depth);
	Ok(())
}

fn print_tree(node: &Node, depth: usize, max_depth: usize) {
	println!("{}{} ({})", "  ".repeat(depth), node.name(), node.kind());
	if depth >= max_depth {
		return;
	}
	for child in node.children() {
		print_tree(&child, depth + 1, max_depth);
	}
}

fn run_dump(opts: &DumpArgs) -> Result<()> {
	let source = opts.archive.open()?;
	let node = resolve(&source, &opts.path)?;
	let json = node_to_json(&node);
	let rendered = if opts.pretty {
		serde_json::to_string_pretty(&json)?
	} else {
		serde_json::to_string(&json)?
	};
	println!("{rendered}");
	Ok(())
}

fn run_export(opts: &ExportArgs) -> Result<()> {
	let source = opts.archive.open()?;
	let node = resolve(&source, &opts.path)?;
	let Some(canvas) = node.as_canvas() else {
		bail!("'{}' is not a canvas node", opts.path);
	};
	let pixels = canvas.pixels();
	if pixels.is_empty() {
		bail!("canvas at '{}' failed to decode", opts.path);
	}
	let image = image::RgbaImage::from_raw(canvas.width(), canvas.height(), pixels.as_ref().clone())
		.context("decoded buffer does not match the canvas dimensions")?;
	image.save(&opts.out)?;
	info!(
		"wrote {}×{} canvas to {}",
		canvas.width(),
		canvas.height(),
		opts.out.display()
	);
	Ok(())
}

fn resolve(source: &Source, path: &str) -> Result<Node> {
	if path.is_empty() {
		return Ok(source.root());
	}
	source
		.root()
		.descend(path)
		.with_context(|| format!("no node at '{path}'"))
}

/// Renders a property subtree as JSON for inspection.
fn node_to_json(node: &Node) -> serde_json::Value {
	use serde_json::{Value as Json, json};

	let payload = match node.value() {
		Value::Null => Json::Null,
		Value::Directory | Value::Image | Value::SubProperty => Json::Null,
		Value::Int16(v) => json!(v),
		Value::Int(v) => json!(v),
		Value::Long(v) => json!(v),
		Value::Float(v) => json!(v),
		Value::Double(v) => json!(v),
		Value::String(s) => json!(s),
		Value::Vector(x, y) => json!({ "x": x, "y": y }),
		Value::Convex(points) => {
			json!(points.iter().map(|(x, y)| json!({ "x": x, "y": y })).collect::<Vec<_>>())
		}
		Value::Canvas(canvas) => json!({
			"width": canvas.width(),
			"height": canvas.height(),
			"format": canvas.format(),
			"scrambled": canvas.is_scrambled(),
		}),
		Value::Sound(sound) => json!({
			"bytes": sound.len(),
			"duration_ms": sound.duration_ms(),
		}),
		Value::Raw(blob) | Value::Video(blob) => json!({
			"type": blob.type_tag(),
			"bytes": blob.len(),
			"head": hex::encode(blob.bytes().iter().take(16).copied().collect::<Vec<u8>>()),
		}),
		Value::Uol(target) => json!({ "link": target }),
	};

	let children = node.children();
	if children.is_empty() {
		return payload;
	}

	let mut object = serde_json::Map::new();
	if !payload.is_null() {
		object.insert("value".to_owned(), payload);
	}
	for child in children {
		object.insert(child.name().to_owned(), node_to_json(&child));
	}
	Json::Object(object)
}
