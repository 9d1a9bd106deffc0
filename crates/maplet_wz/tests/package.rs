//! Directory-shard package and resource-manager tests.

mod common;

use std::fs;

use common::{ArchiveBuilder, Entry, Prop};
use maplet_wz::source::Layout;
use maplet_wz::{PackageSource, ResourceManager, Source, SourceOptions};

const TEST_VERSION: u16 = 95;

fn write_shard(dir: &std::path::Path, file: &str, entries: &[Entry]) {
	let bytes = ArchiveBuilder::new(TEST_VERSION, [0; 4]).build(entries);
	fs::write(dir.join(file), bytes).unwrap();
}

/// Shard package with disjoint roots: `A/B`, `C`, `D`.
fn build_package(dir: &std::path::Path) {
	fs::write(dir.join("pkg.ini"), "LastWzIndex|2\n").unwrap();
	write_shard(
		dir,
		"pkg_000.wz",
		&[Entry::Dir("A", vec![Entry::Img("B", vec![Prop::Int("inner", 1)])])],
	);
	write_shard(dir, "pkg_001.wz", &[Entry::Img("C", vec![Prop::Int("x", 2)])]);
	write_shard(dir, "pkg_002.wz", &[Entry::Img("D", vec![Prop::Int("x", 3)])]);
}

#[test]
fn test_shard_merge() {
	let dir = tempfile::tempdir().unwrap();
	build_package(dir.path());

	let package = PackageSource::open(dir.path(), "pkg", SourceOptions::default()).unwrap();
	assert_eq!(package.shards().len(), 3);

	let root = package.root();
	let names: Vec<String> = root.children().iter().map(|c| c.name().to_owned()).collect();
	assert_eq!(names, vec!["A", "C", "D"]);
	// The merged tree resolves through the reparented shard nodes.
	assert!(root.descend("A/B").is_some());
	assert_eq!(root.descend("A/B/inner").unwrap().as_int(0), 1);
	assert_eq!(root.descend("C/x").unwrap().as_int(0), 2);
	assert_eq!(root.descend("D/x").unwrap().as_int(0), 3);
	// Reparenting preserves node identity: the shard root's child is
	// the merged root's child.
	assert_eq!(package.shards()[1].root().child("C"), root.child("C"));
	assert_eq!(package.info().layout, Layout::Package);
}

#[test]
fn test_missing_shard_is_skipped() {
	let dir = tempfile::tempdir().unwrap();
	fs::write(dir.path().join("pkg.ini"), "LastWzIndex|2\n").unwrap();
	write_shard(dir.path(), "pkg_000.wz", &[Entry::Img("C", vec![Prop::Int("x", 2)])]);
	// pkg_001.wz deliberately absent.
	write_shard(dir.path(), "pkg_002.wz", &[Entry::Img("D", vec![Prop::Int("x", 3)])]);

	let package = PackageSource::open(dir.path(), "pkg", SourceOptions::default()).unwrap();
	assert_eq!(package.shards().len(), 2);
	assert!(package.root().child("C").is_some());
	assert!(package.root().child("D").is_some());
}

#[test]
fn test_single_file_sentinel() {
	let dir = tempfile::tempdir().unwrap();
	fs::write(dir.path().join("pkg.ini"), "LastWzIndex|-1\n").unwrap();
	write_shard(dir.path(), "pkg.wz", &[Entry::Img("only", vec![Prop::Int("x", 9)])]);

	let package = PackageSource::open(dir.path(), "pkg", SourceOptions::default()).unwrap();
	assert_eq!(package.shards().len(), 1);
	assert_eq!(package.root().descend("only/x").unwrap().as_int(0), 9);
}

#[test]
fn test_unpadded_shard_fallback() {
	let dir = tempfile::tempdir().unwrap();
	fs::write(dir.path().join("pkg.ini"), "LastWzIndex|0\n").unwrap();
	write_shard(dir.path(), "pkg_0.wz", &[Entry::Img("only", vec![Prop::Int("x", 4)])]);

	let package = PackageSource::open(dir.path(), "pkg", SourceOptions::default()).unwrap();
	assert_eq!(package.root().descend("only/x").unwrap().as_int(0), 4);
}

#[test]
fn test_nested_package() {
	let dir = tempfile::tempdir().unwrap();
	fs::write(dir.path().join("pkg.ini"), "LastWzIndex|-1\n").unwrap();
	write_shard(dir.path(), "pkg.wz", &[Entry::Img("top", vec![Prop::Int("x", 1)])]);

	let nested_dir = dir.path().join("Extra");
	fs::create_dir(&nested_dir).unwrap();
	fs::write(nested_dir.join("Extra.ini"), "LastWzIndex|-1\n").unwrap();
	write_shard(&nested_dir, "Extra.wz", &[Entry::Img("deep", vec![Prop::Int("x", 5)])]);

	let package = PackageSource::open(dir.path(), "pkg", SourceOptions::default()).unwrap();
	assert_eq!(package.nested().len(), 1);
	assert_eq!(package.root().descend("Extra/deep/x").unwrap().as_int(0), 5);
}

#[test]
fn test_empty_directory_fails() {
	let dir = tempfile::tempdir().unwrap();
	assert!(PackageSource::open(dir.path(), "pkg", SourceOptions::default()).is_err());
}

/// Base + one more archive on disk, manager initialization and the
/// version manifest.
#[test_log::test]
fn test_manager_initialize() {
	let dir = tempfile::tempdir().unwrap();
	write_shard(
		dir.path(),
		"Base.wz",
		&[
			Entry::Img(
				"Version.img",
				vec![Prop::Int("UI", 7), Prop::Int("Character", 12)],
			),
			Entry::Img("zmap.img", vec![Prop::Null("weapon"), Prop::Null("body")]),
		],
	);
	write_shard(
		dir.path(),
		"UI.wz",
		&[Entry::Img("Basic.img", vec![Prop::Int("cursor", 1)])],
	);

	let rm = ResourceManager::initialize(dir.path(), SourceOptions::default()).unwrap();
	assert_eq!(rm.archive_names(), vec!["Base", "UI"]);
	assert_eq!(rm.version_of("UI"), 7);
	assert_eq!(rm.version_of("Character"), 12);
	assert_eq!(rm.version_of("Map"), 0);

	assert_eq!(rm.get_property("UI/Basic.img/cursor").as_int(0), 1);
	assert_eq!(rm.get_property("Base/zmap.img").child_count(), 2);
	// Misses come back as an empty property, never a broken handle.
	assert_eq!(rm.get_property("UI/Missing.img/child").child_count(), 0);
}

#[test_log::test]
fn test_manager_outlink_across_archives() {
	let dir = tempfile::tempdir().unwrap();
	write_shard(
		dir.path(),
		"Base.wz",
		&[Entry::Img("Version.img", vec![])],
	);
	write_shard(
		dir.path(),
		"UI.wz",
		&[Entry::Img(
			"B.img",
			vec![Prop::Canvas {
				name: "pic",
				width: 1,
				height: 1,
				format: maplet_wz::pixel::FORMAT_ARGB8888,
				payload: vec![0xFF, 0, 0, 0],
				scrambled: false,
				children: vec![Prop::Str("_outlink", "Map/C.img/real")],
			}],
		)],
	);
	write_shard(
		dir.path(),
		"Map.wz",
		&[Entry::Img(
			"C.img",
			vec![Prop::Canvas {
				name: "real",
				width: 1,
				height: 1,
				format: maplet_wz::pixel::FORMAT_ARGB8888,
				payload: vec![0xFF, 0x12, 0x34, 0x56],
				scrambled: false,
				children: vec![],
			}],
		)],
	);

	let rm = ResourceManager::initialize(dir.path(), SourceOptions::default()).unwrap();
	let pic = rm.get_property("UI/B.img/pic");
	// The cross-archive link routes through the manager.
	assert_eq!(*pic.as_canvas().unwrap().pixels(), vec![0x12, 0x34, 0x56, 0xFF]);
}

#[test]
fn test_source_open_sniffs_layout() {
	let dir = tempfile::tempdir().unwrap();
	build_package(dir.path());
	let as_package = Source::open(dir.path(), "pkg", SourceOptions::default()).unwrap();
	assert!(matches!(as_package, Source::Package(_)));

	let file_path = dir.path().join("pkg_000.wz");
	let as_file = Source::open(&file_path, "pkg", SourceOptions::default()).unwrap();
	assert!(matches!(as_file, Source::File(_)));
}
