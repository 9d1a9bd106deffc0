//! Face and face-accessory composition.
//!
//! A character's face is pre-rendered per emotion: the face item's
//! canvas and the face accessory's canvas (when worn) are merged into
//! one surface per frame, anchored at the brow, so the renderer blits a
//! single layer at run time.
//!
//! # Emotions
//!
//! Emotions are a fixed 39-entry namespace. Indices `0..=22` are the
//! base expressions, `23..=37` alias `8..=22` (duplicated ids kept for
//! wire compatibility), and `38` is `qBlue` — which face accessories do
//! not carry, so accessory lookups remap it to the default expression.
//!
//! # Pairing
//!
//! The side with more frames drives the iteration; the other side is
//! indexed modulo its frame count. A frame that is a bare integer is not
//! a frame at all: it overrides the emotion's total duration.
//!
//! Composed sequences cache under `(face, emotion, accessory)` with a
//! bounded LRU: stale entries are swept by idle time, and the least
//! recently used entry falls out when the table outgrows its capacity.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use log::warn;
use maplet_wz::{Canvas, Node, Value};

use crate::compose::{ItemProvider, Rect};
use crate::zmap::LayerOrder;

/// Number of emotion codes.
pub const EMOTION_COUNT: usize = 39;

/// The default (neutral) emotion code.
pub const EMOTION_DEFAULT: i32 = 0;

/// The blink emotion code.
pub const EMOTION_BLINK: i32 = 1;

/// The aliased special emotion at the end of the table.
pub const EMOTION_QBLUE: i32 = 38;

/// Job ids of the Pinkbean class, which renders no face at all.
pub const PINKBEAN_JOBS: [i32; 2] = [13_000, 13_100];

/// Default per-frame delay in milliseconds.
const DEFAULT_FACE_DELAY: i32 = 60;

/// Default total emotion duration in milliseconds.
const DEFAULT_TOTAL_DURATION: i32 = 5000;

/// Default cache capacity in entries.
const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Default idle eviction threshold in milliseconds.
const DEFAULT_IDLE_TTL_MS: u64 = 60_000;

const BASE_EMOTIONS: [&str; 23] = [
	"default",
	"blink",
	"hit",
	"smile",
	"troubled",
	"cry",
	"angry",
	"bewildered",
	"stunned",
	"vomit",
	"oops",
	"cheers",
	"chu",
	"wink",
	"pain",
	"glitter",
	"despair",
	"love",
	"shine",
	"blaze",
	"hum",
	"bowing",
	"hot",
];

/// Child name of an emotion code, `None` outside `0..=38`.
pub fn emotion_name(code: i32) -> Option<&'static str> {
	match code {
		0..=22 => Some(BASE_EMOTIONS[code as usize]),
		23..=37 => Some(BASE_EMOTIONS[(code - 15) as usize]),
		EMOTION_QBLUE => Some("qBlue"),
		_ => None,
	}
}

/// One composed face frame.
#[derive(Debug, Clone)]
pub struct FaceFrame {
	/// The merged surface
	pub canvas: Canvas,
	/// Anchor offset of the surface (negated union corner)
	pub origin: (i32, i32),
	/// Frame delay in milliseconds
	pub delay: i32,
}

/// A composed per-emotion frame sequence.
#[derive(Debug, Clone, Default)]
pub struct FaceLook {
	/// Frames in playback order
	pub frames: Vec<FaceFrame>,
	/// Total duration of one emotion cycle in milliseconds
	pub total_duration: i32,
}

/// Inputs that vary per character but are not part of the cache key.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaceLookOptions {
	/// Skin id, used as the fallback accessory canvas name
	pub skin: i32,
	/// Job id (Pinkbean jobs render no face)
	pub job: i32,
	/// Treat the accessory as invisible regardless of its flag
	pub ignore_invisible_face: bool,
}

struct CacheEntry {
	look: Rc<FaceLook>,
	last_access: Cell<u64>,
}

/// The face-look compositor and its bounded LRU cache.
pub struct FaceLookCache<P> {
	items: P,
	order: LayerOrder,
	cache: RefCell<HashMap<(i32, i32, i32), CacheEntry>>,
	capacity: usize,
	idle_ttl_ms: u64,
}

impl<P: ItemProvider> FaceLookCache<P> {
	/// Creates a cache with the default capacity and idle TTL.
	pub fn new(items: P, order: LayerOrder) -> Self {
		Self::with_policy(items, order, DEFAULT_CACHE_CAPACITY, DEFAULT_IDLE_TTL_MS)
	}

	/// Creates a cache with an explicit eviction policy.
	pub fn with_policy(items: P, order: LayerOrder, capacity: usize, idle_ttl_ms: u64) -> Self {
		Self {
			items,
			order,
			cache: RefCell::new(HashMap::new()),
			capacity: capacity.max(1),
			idle_ttl_ms,
		}
	}

	/// Number of cached sequences.
	pub fn len(&self) -> usize {
		self.cache.borrow().len()
	}

	/// True if nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.cache.borrow().is_empty()
	}

	/// Returns the composed sequence for `(face, emotion, accessory)`,
	/// composing and caching on first request.
	///
	/// Repeat calls with the same key return the identical sequence.
	pub fn get(
		&self,
		face: i32,
		emotion: i32,
		accessory: i32,
		options: &FaceLookOptions,
		t_now: u64,
	) -> Rc<FaceLook> {
		let emotion = emotion.clamp(0, EMOTION_QBLUE);
		let key = (face, emotion, accessory);
		if let Some(entry) = self.cache.borrow().get(&key) {
			entry.last_access.set(t_now);
			return Rc::clone(&entry.look);
		}

		let look = Rc::new(self.compose(face, emotion, accessory, options));
		self.cache.borrow_mut().insert(
			key,
			CacheEntry {
				look: Rc::clone(&look),
				last_access: Cell::new(t_now),
			},
		);
		self.sweep(t_now);
		look
	}

	/// Evicts idle entries and enforces the capacity bound.
	pub fn sweep(&self, t_now: u64) {
		let mut cache = self.cache.borrow_mut();
		cache.retain(|_, entry| {
			t_now.saturating_sub(entry.last_access.get()) <= self.idle_ttl_ms
		});
		while cache.len() > self.capacity {
			let Some(oldest) = cache
				.iter()
				.min_by_key(|(_, entry)| entry.last_access.get())
				.map(|(key, _)| *key)
			else {
				break;
			};
			cache.remove(&oldest);
		}
	}

	fn compose(&self, face: i32, emotion: i32, accessory: i32, options: &FaceLookOptions) -> FaceLook {
		if PINKBEAN_JOBS.contains(&options.job) {
			return FaceLook::default();
		}
		let Some(face_item) = self.items.entry(face) else {
			warn!("face item {face} is missing");
			return FaceLook::default();
		};
		let accessory_item = if accessory > 0 { self.items.entry(accessory) } else { None };

		let Some(face_name) = emotion_name(emotion) else {
			return FaceLook::default();
		};
		// Accessories carry no qBlue frames; remap to the default.
		let accessory_emotion = if emotion == EMOTION_QBLUE { EMOTION_DEFAULT } else { emotion };
		let accessory_name = emotion_name(accessory_emotion).unwrap_or("default");

		let Some(face_node) = face_item.action_root().child(face_name) else {
			return FaceLook::default();
		};
		let accessory_node = accessory_item
			.as_ref()
			.and_then(|item| item.action_root().child(accessory_name));

		let face_invisible = accessory_item
			.as_ref()
			.is_some_and(|item| item.invisible_face)
			|| options.ignore_invisible_face;

		let face_count = count_numeric_children(&face_node);
		let accessory_count = accessory_node.as_ref().map_or(0, count_numeric_children);
		if face_count == 0 {
			return FaceLook::default();
		}

		// The longer side drives; the other side wraps around.
		let accessory_drives = accessory_count > face_count;
		let driver_count = face_count.max(accessory_count);

		let mut look = FaceLook {
			frames: Vec::with_capacity(driver_count),
			total_duration: DEFAULT_TOTAL_DURATION,
		};

		for index in 0..driver_count {
			let (face_index, accessory_index) = if accessory_drives {
				(index % face_count, index)
			} else {
				(index, if accessory_count > 0 { index % accessory_count } else { 0 })
			};

			let face_frame = face_node.child(&face_index.to_string());
			let accessory_frame = accessory_node
				.as_ref()
				.and_then(|node| node.child(&accessory_index.to_string()));

			// A bare integer overrides the cycle duration.
			if let Some(node) = &face_frame
				&& let Value::Int(duration) = node.value()
			{
				look.total_duration = duration;
				continue;
			}
			if let Some(node) = &accessory_frame
				&& let Value::Int(duration) = node.value()
			{
				look.total_duration = duration;
				continue;
			}

			let Some(face_frame) = face_frame else {
				continue;
			};
			let face_part = face_frame.child("face");
			let face_sprite = face_part.as_ref().and_then(|node| self.sprite_of(node, options));
			let accessory_sprite = accessory_frame
				.as_ref()
				.and_then(|node| self.accessory_sprite(node, options));

			let driving_frame = if accessory_drives {
				accessory_frame.as_ref().unwrap_or(&face_frame)
			} else {
				&face_frame
			};
			let delay = driving_frame
				.child("delay")
				.map_or(DEFAULT_FACE_DELAY, |n| n.as_int(DEFAULT_FACE_DELAY));

			if let Some(frame) =
				compose_frame(face_sprite, accessory_sprite, face_invisible, delay)
			{
				look.frames.push(frame);
			}
		}
		look
	}

	/// Reads a positioned sprite from a canvas property node.
	fn sprite_of(&self, node: &Node, _options: &FaceLookOptions) -> Option<Sprite> {
		let canvas = node.as_canvas()?;
		let resolved = node.resolve_linked(0)?;
		let origin = resolved
			.child("origin")
			.and_then(|n| n.as_vector())
			.unwrap_or((0, 0));
		let brow = resolved
			.child("map")
			.and_then(|map| map.child("brow"))
			.and_then(|n| n.as_vector())
			.unwrap_or((0, 0));
		let z = resolved
			.child("z")
			.map_or(0, |n| match n.value() {
				Value::String(name) => self.order.z_of(&name),
				_ => n.as_int(0),
			});
		Some(Sprite {
			canvas,
			origin,
			brow,
			z,
		})
	}

	/// Reads the accessory's canvas: the `default` child, with a child
	/// named after the skin id as fallback, or the frame node itself.
	fn accessory_sprite(&self, frame: &Node, options: &FaceLookOptions) -> Option<Sprite> {
		let carrier = frame
			.child("default")
			.or_else(|| frame.child(&options.skin.to_string()))
			.unwrap_or_else(|| frame.clone());
		self.sprite_of(&carrier, options)
	}
}

impl<P> std::fmt::Debug for FaceLookCache<P> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"FaceLookCache({} cached, capacity {})",
			self.cache.borrow().len(),
			self.capacity
		)
	}
}

/// Counts the numeric children (`"0"`, `"1"`, …) of an emotion node.
/// Duration overrides are numeric too; the composition loop skips them.
fn count_numeric_children(node: &Node) -> usize {
	node.children()
		.iter()
		.filter(|child| child.name().bytes().all(|b| b.is_ascii_digit()))
		.count()
}

/// A canvas with its placement metadata, pre-composition.
struct Sprite {
	canvas: Canvas,
	origin: (i32, i32),
	brow: (i32, i32),
	z: i32,
}

impl Sprite {
	/// Frame-space rectangle with the brow pinned at the frame origin.
	fn rect(&self) -> Rect {
		Rect::from_origin_size(
			-self.brow.0 - self.origin.0,
			-self.brow.1 - self.origin.1,
			self.canvas.width() as i32,
			self.canvas.height() as i32,
		)
	}
}

/// Merges the face and accessory sprites over the union rectangle.
fn compose_frame(
	face: Option<Sprite>,
	accessory: Option<Sprite>,
	face_invisible: bool,
	delay: i32,
) -> Option<FaceFrame> {
	let mut sprites: Vec<(Sprite, i32)> = Vec::new();
	if let Some(sprite) = face {
		let alpha = if face_invisible { 0 } else { 255 };
		sprites.push((sprite, alpha));
	}
	if let Some(sprite) = accessory {
		sprites.push((sprite, 255));
	}
	if sprites.is_empty() {
		return None;
	}

	let union = sprites
		.iter()
		.fold(Rect::default(), |acc, (sprite, _)| acc.union(&sprite.rect()));
	if union.is_empty() {
		return None;
	}

	let width = union.width() as u32;
	let height = union.height() as u32;
	let mut buffer = vec![0u8; (width * height * 4) as usize];

	// Lower z draws first.
	sprites.sort_by_key(|(sprite, _)| sprite.z);
	for (sprite, alpha) in &sprites {
		let rect = sprite.rect();
		blend_source_over(
			&mut buffer,
			width,
			(rect.left - union.left, rect.top - union.top),
			&sprite.canvas,
			*alpha,
		);
	}

	Some(FaceFrame {
		canvas: Canvas::from_rgba(width, height, buffer),
		origin: (-union.left, -union.top),
		delay: delay.max(1),
	})
}

/// Source-over blend of `src` into `dst` at `offset`.
///
/// Where the destination is still fully transparent the source is
/// copied; elsewhere the alpha composes as
/// `out_a = src_a + dst_a * (255 - src_a) / 255`.
fn blend_source_over(dst: &mut [u8], dst_width: u32, offset: (i32, i32), src: &Canvas, alpha: i32) {
	let pixels = src.pixels();
	if pixels.is_empty() {
		return;
	}
	let (src_w, src_h) = (src.width() as i32, src.height() as i32);
	let dst_w = dst_width as i32;
	let dst_h = (dst.len() as i32 / 4) / dst_w;

	for sy in 0..src_h {
		let dy = offset.1 + sy;
		if dy < 0 || dy >= dst_h {
			continue;
		}
		for sx in 0..src_w {
			let dx = offset.0 + sx;
			if dx < 0 || dx >= dst_w {
				continue;
			}
			let si = ((sy * src_w + sx) * 4) as usize;
			let di = ((dy * dst_w + dx) * 4) as usize;

			let src_a = i32::from(pixels[si + 3]) * alpha / 255;
			if src_a == 0 {
				continue;
			}
			let dst_a = i32::from(dst[di + 3]);
			if dst_a == 0 {
				dst[di] = pixels[si];
				dst[di + 1] = pixels[si + 1];
				dst[di + 2] = pixels[si + 2];
				dst[di + 3] = src_a as u8;
				continue;
			}

			let out_a = src_a + dst_a * (255 - src_a) / 255;
			for ch in 0..3 {
				let src_c = i32::from(pixels[si + ch]);
				let dst_c = i32::from(dst[di + ch]);
				let blended =
					(src_c * src_a + dst_c * dst_a * (255 - src_a) / 255) / out_a.max(1);
				dst[di + ch] = blended.clamp(0, 255) as u8;
			}
			dst[di + 3] = out_a.clamp(0, 255) as u8;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::item::ItemEntry;
	use crate::zmap::{SlotMap, ZMap};
	use std::collections::HashMap as Map;

	struct StubItems {
		entries: Map<i32, Rc<ItemEntry>>,
	}

	impl ItemProvider for StubItems {
		fn entry(&self, id: i32) -> Option<Rc<ItemEntry>> {
			self.entries.get(&id).cloned()
		}
	}

	fn solid_canvas(color: [u8; 4]) -> Canvas {
		let mut pixels = Vec::new();
		for _ in 0..4 {
			pixels.extend_from_slice(&color);
		}
		Canvas::from_rgba(2, 2, pixels)
	}

	fn face_part(color: [u8; 4], origin: (i32, i32), brow: (i32, i32)) -> Node {
		let part = Node::new("face", Value::Canvas(solid_canvas(color)));
		part.append_child(Node::new("origin", Value::Vector(origin.0, origin.1)));
		part.append_child(Node::new("z", Value::String("face".into())));
		let map = Node::sub_property("map");
		map.append_child(Node::new("brow", Value::Vector(brow.0, brow.1)));
		part.append_child(map);
		part
	}

	/// Face item with a `smile` emotion of `n` frames; frame `i` is a
	/// solid color keyed by `i` so pairing is observable.
	fn face_item(frames: usize) -> Node {
		let root = Node::image("00020000.img");
		let smile = Node::sub_property("smile");
		for i in 0..frames {
			let frame = Node::sub_property(i.to_string());
			frame.append_child(face_part([10 + i as u8, 0, 0, 255], (0, 0), (10, 20)));
			frame.append_child(Node::new("delay", Value::Int(200)));
			smile.append_child(frame);
		}
		root.append_child(smile);
		root
	}

	fn accessory_item(frames: usize) -> Node {
		let root = Node::image("01010001.img");
		let smile = Node::sub_property("smile");
		for i in 0..frames {
			let frame = Node::sub_property(i.to_string());
			// Accessories carry their canvas on the `default` child.
			let canvas = Node::new("default", Value::Canvas(solid_canvas([0, 200, 0, 255])));
			canvas.append_child(Node::new("origin", Value::Vector(0, 0)));
			canvas.append_child(Node::new("z", Value::String("faceAccessory".into())));
			let map = Node::sub_property("map");
			map.append_child(Node::new("brow", Value::Vector(12, 22)));
			canvas.append_child(map);
			frame.append_child(canvas);
			frame.append_child(Node::new("delay", Value::Int(100)));
			smile.append_child(frame);
		}
		root.append_child(smile);
		root
	}

	fn cache_for(nodes: Vec<(i32, Node)>) -> FaceLookCache<StubItems> {
		let zmap_node = Node::sub_property("zmap.img");
		for name in ["faceAccessory", "face"] {
			zmap_node.append_child(Node::new(name, Value::Null));
		}
		let order = LayerOrder {
			zmap: ZMap::load(&zmap_node),
			smap: SlotMap::default(),
		};
		let entries = nodes
			.into_iter()
			.map(|(id, root)| (id, Rc::new(ItemEntry::from_root(id, root))))
			.collect();
		FaceLookCache::new(
			StubItems {
				entries,
			},
			order,
		)
	}

	#[test]
	fn test_emotion_name_table() {
		assert_eq!(emotion_name(0), Some("default"));
		assert_eq!(emotion_name(1), Some("blink"));
		assert_eq!(emotion_name(3), Some("smile"));
		// The alias band maps back onto 8..=22.
		assert_eq!(emotion_name(23), emotion_name(8));
		assert_eq!(emotion_name(37), emotion_name(22));
		assert_eq!(emotion_name(38), Some("qBlue"));
		assert_eq!(emotion_name(39), None);
		assert_eq!(emotion_name(-1), None);
	}

	#[test]
	fn test_face_only_composition() {
		let cache = cache_for(vec![(20_000, face_item(2))]);
		let look = cache.get(20_000, 3, 0, &FaceLookOptions::default(), 0);
		assert_eq!(look.frames.len(), 2);
		let frame = &look.frames[0];
		assert_eq!(frame.canvas.width(), 2);
		assert_eq!(frame.origin, (10, 20));
		assert_eq!(frame.delay, 200);
		assert_eq!(look.total_duration, 5000);
	}

	#[test]
	fn test_accessory_drives_with_modulo_pairing() {
		let cache = cache_for(vec![(20_000, face_item(2)), (1_010_001, accessory_item(4))]);
		let look = cache.get(20_000, 3, 1_010_001, &FaceLookOptions::default(), 0);

		// Accessory has more frames, so it drives.
		assert_eq!(look.frames.len(), 4);
		// Union covers both rects: face at (-10,-20), accessory at
		// (-12,-22), both 2×2 → union is 4×4.
		assert_eq!(look.frames[0].canvas.width(), 4);
		assert_eq!(look.frames[0].canvas.height(), 4);
		assert_eq!(look.frames[0].origin, (12, 22));
		assert_eq!(look.frames[0].delay, 100);

		// Face frame i % 2 pairs with accessory frame i: the face's red
		// marker pixel cycles 10, 11, 10, 11.
		for (i, frame) in look.frames.iter().enumerate() {
			let pixels = frame.canvas.pixels();
			// Face pixels land at (2,2); red channel encodes its index.
			let offset = ((2 * 4 + 2) * 4) as usize;
			assert_eq!(pixels[offset], 10 + (i % 2) as u8, "frame {i}");
		}
	}

	#[test]
	fn test_integer_frame_overrides_duration() {
		let root = face_item(1);
		root.child("smile")
			.unwrap()
			.append_child(Node::new("1", Value::Int(2750)));
		let cache = cache_for(vec![(20_000, root)]);
		let look = cache.get(20_000, 3, 0, &FaceLookOptions::default(), 0);
		assert_eq!(look.frames.len(), 1);
		assert_eq!(look.total_duration, 2750);
	}

	#[test]
	fn test_pinkbean_renders_no_face() {
		let cache = cache_for(vec![(20_000, face_item(2))]);
		let options = FaceLookOptions {
			job: 13_000,
			..FaceLookOptions::default()
		};
		let look = cache.get(20_000, 3, 0, &options, 0);
		assert!(look.frames.is_empty());
	}

	#[test]
	fn test_repeat_lookup_is_identical() {
		let cache = cache_for(vec![(20_000, face_item(2))]);
		let first = cache.get(20_000, 3, 0, &FaceLookOptions::default(), 0);
		let second = cache.get(20_000, 3, 0, &FaceLookOptions::default(), 10);
		assert!(Rc::ptr_eq(&first, &second));
		for (a, b) in first.frames.iter().zip(second.frames.iter()) {
			assert_eq!(*a.canvas.pixels(), *b.canvas.pixels());
		}
	}

	#[test]
	fn test_cache_capacity_bound() {
		let cache = FaceLookCache::with_policy(
			StubItems {
				entries: [(20_000, Rc::new(ItemEntry::from_root(20_000, face_item(1))))]
					.into_iter()
					.collect(),
			},
			LayerOrder::default(),
			2,
			u64::MAX,
		);
		for emotion in 0..5 {
			cache.get(20_000, emotion, 0, &FaceLookOptions::default(), emotion as u64);
		}
		assert!(cache.len() <= 2);
	}

	#[test]
	fn test_idle_entries_swept() {
		let cache = cache_for(vec![(20_000, face_item(1))]);
		cache.get(20_000, 3, 0, &FaceLookOptions::default(), 0);
		assert_eq!(cache.len(), 1);
		cache.sweep(DEFAULT_IDLE_TTL_MS + 1);
		assert!(cache.is_empty());
	}
}
