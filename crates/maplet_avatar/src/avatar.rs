//! Avatar animation state.
//!
//! The [`Avatar`] holds one character's appearance snapshot and the
//! animation clock: current action, frame index, remaining frame delay,
//! emotion and blink timers. It advances exactly once per game tick via
//! [`Avatar::update`]; wall-clock time only enters through the caller's
//! `t_now`, so a sequence of updates is fully deterministic for a seeded
//! avatar.
//!
//! # Move actions
//!
//! The wire protocol packs an action and a facing direction into one
//! integer: bit 0 is the direction, the remaining bits the action code.
//! [`unpack_move_action`] / [`pack_move_action`] convert.
//!
//! # Slots
//!
//! Two animation slots exist. The *continuous* slot loops the current
//! move action (or a forced stand action). The *one-time* slot, when
//! armed, plays a single cycle and falls back to the continuous slot;
//! arming it again discards the previous one-time state. Each slot
//! steps `Idle → Playing → (Repeating | Complete → Idle)`.

use std::collections::HashMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::action::ActionTable;
use crate::compose::BodyPart;
use crate::face::{EMOTION_BLINK, EMOTION_DEFAULT};

/// How long a blink holds, in milliseconds.
const BLINK_DURATION_MS: u64 = 250;

/// Bounds of the random pause between blinks, in milliseconds.
const BLINK_INTERVAL_MS: std::ops::Range<u64> = 2000..7000;

/// Splits a packed move action into (action code, facing left).
#[inline]
pub fn unpack_move_action(packed: i32) -> (u16, bool) {
	((packed >> 1) as u16, packed & 1 == 1)
}

/// Packs an action code and a facing direction.
#[inline]
pub fn pack_move_action(action: u16, facing_left: bool) -> i32 {
	(i32::from(action) << 1) | i32::from(facing_left)
}

/// A character's visible configuration.
#[derive(Debug, Clone, Default)]
pub struct Appearance {
	/// Skin id
	pub skin: i32,
	/// Face item id
	pub face: i32,
	/// Job id
	pub job: i32,
	/// Equipped item ids per slot
	pub equips: HashMap<BodyPart, i32>,
	/// Pet ids
	pub pets: [i32; 3],
	/// Morph template id (`0` for none)
	pub morph: i32,
	/// Riding vehicle id (`0` for none)
	pub riding: i32,
}

/// Progress of an animation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
	/// Armed but not yet advanced
	Idle,
	/// Mid-cycle
	Playing,
	/// Looped past the end at least once
	Repeating,
	/// Finished (one-time slots only)
	Complete,
}

/// One animation slot's clock.
#[derive(Debug, Clone)]
struct Slot {
	action: u16,
	frame: usize,
	remaining: i32,
	state: PlayState,
	once: bool,
}

impl Slot {
	fn new(action: u16, once: bool) -> Self {
		Self {
			action,
			frame: 0,
			remaining: 0,
			state: PlayState::Idle,
			once,
		}
	}

	/// Advances the clock by `dt` milliseconds.
	fn advance(&mut self, table: &ActionTable, dt: i32) {
		let Some(entry) = table.entry(self.action) else {
			self.state = PlayState::Complete;
			return;
		};
		if entry.pieces.is_empty() {
			self.state = PlayState::Complete;
			return;
		}

		if self.state == PlayState::Idle {
			self.state = PlayState::Playing;
			self.frame = 0;
			self.remaining = entry.pieces[0].delay;
		}
		if self.state == PlayState::Complete {
			return;
		}

		self.remaining -= dt;
		while self.remaining <= 0 {
			let next = self.frame + 1;
			if next >= entry.pieces.len() {
				if self.once {
					self.state = PlayState::Complete;
					self.remaining = 0;
					return;
				}
				self.state = PlayState::Repeating;
				// A non-negative repeat index restarts mid-sequence.
				self.frame = if entry.repeat >= 0 {
					(entry.repeat as usize).min(entry.pieces.len() - 1)
				} else {
					0
				};
			} else {
				self.frame = next;
			}
			self.remaining += entry.pieces[self.frame].delay;
		}
	}
}

/// A character's animation state machine.
pub struct Avatar {
	appearance: Appearance,
	move_action: i32,
	forced_stand: Option<u16>,
	one_time: Option<Slot>,
	continuous: Slot,
	emotion: i32,
	emotion_end: u64,
	blinking: bool,
	blink_end: u64,
	next_blink: u64,
	scale: f32,
	flip: bool,
	last_tick: Option<u64>,
	rng: SmallRng,
}

impl Avatar {
	/// Creates an avatar standing still with the given appearance.
	pub fn new(appearance: Appearance) -> Self {
		Self::with_seed(appearance, rand::rng().random())
	}

	/// Creates an avatar with a deterministic blink/random-move seed.
	pub fn with_seed(appearance: Appearance, seed: u64) -> Self {
		Self {
			appearance,
			move_action: 0,
			forced_stand: None,
			one_time: None,
			continuous: Slot::new(0, false),
			emotion: EMOTION_DEFAULT,
			emotion_end: 0,
			blinking: false,
			blink_end: 0,
			next_blink: 0,
			scale: 1.0,
			flip: false,
			last_tick: None,
			rng: SmallRng::seed_from_u64(seed),
		}
	}

	/// The appearance snapshot.
	pub fn appearance(&self) -> &Appearance {
		&self.appearance
	}

	/// Mutable appearance; edits become visible on the next update.
	pub fn appearance_mut(&mut self) -> &mut Appearance {
		&mut self.appearance
	}

	/// Currently displayed action and facing direction.
	///
	/// Precedence: one-time slot, forced stand, then the move action.
	pub fn current_action(&self) -> (u16, bool) {
		let (_, facing_left) = unpack_move_action(self.move_action);
		if let Some(slot) = &self.one_time {
			return (slot.action, facing_left);
		}
		if let Some(action) = self.forced_stand {
			return (action, facing_left);
		}
		unpack_move_action(self.move_action)
	}

	/// Frame index of the active slot.
	pub fn current_frame(&self) -> usize {
		self.active_slot().frame
	}

	/// Play state of the active slot.
	pub fn state(&self) -> PlayState {
		self.active_slot().state
	}

	/// Emotion currently shown (blinking overrides).
	pub fn current_emotion(&self) -> i32 {
		if self.blinking {
			EMOTION_BLINK
		} else {
			self.emotion
		}
	}

	/// Render scale.
	pub fn scale(&self) -> f32 {
		self.scale
	}

	/// Sets the render scale.
	pub fn set_scale(&mut self, scale: f32) {
		self.scale = scale;
	}

	/// Horizontal mirror override.
	pub fn flipped(&self) -> bool {
		self.flip
	}

	/// Sets the horizontal mirror override.
	pub fn set_flipped(&mut self, flip: bool) {
		self.flip = flip;
	}

	fn active_slot(&self) -> &Slot {
		self.one_time.as_ref().unwrap_or(&self.continuous)
	}

	/// Sets the continuous move action from its packed encoding.
	pub fn set_move_action(&mut self, packed: i32) {
		if packed == self.move_action && self.forced_stand.is_none() {
			return;
		}
		self.move_action = packed;
		self.forced_stand = None;
		let (action, _) = unpack_move_action(packed);
		self.continuous = Slot::new(action, false);
	}

	/// Forces a continuous stand action, overriding the move action.
	pub fn force_stand(&mut self, action: u16) {
		self.forced_stand = Some(action);
		self.continuous = Slot::new(action, false);
	}

	/// Plays an action once, then falls back to the continuous slot.
	///
	/// Arming again discards any in-flight one-time state.
	pub fn play_once(&mut self, action: u16) {
		self.one_time = Some(Slot::new(action, true));
	}

	/// Sets the emotion until `t_now + duration_ms`.
	pub fn set_emotion(&mut self, emotion: i32, duration_ms: u64, t_now: u64) {
		self.emotion = emotion;
		self.emotion_end = t_now + duration_ms;
	}

	/// Advances all timers to `t_now`.
	///
	/// Must be called once per game tick from one consistent thread.
	pub fn update(&mut self, table: &ActionTable, t_now: u64) {
		let dt = match self.last_tick {
			Some(last) => t_now.saturating_sub(last) as i32,
			None => {
				// First tick anchors the blink schedule.
				self.next_blink = t_now + self.rng.random_range(BLINK_INTERVAL_MS);
				0
			}
		};
		self.last_tick = Some(t_now);

		// One-time slot first; on completion fall back to continuous.
		if let Some(slot) = &mut self.one_time {
			slot.advance(table, dt);
			if slot.state == PlayState::Complete {
				self.one_time = None;
			}
		} else {
			let was_repeating = self.continuous.state == PlayState::Repeating;
			self.continuous.advance(table, dt);
			if !was_repeating && self.continuous.state == PlayState::Repeating {
				self.maybe_random_move(table);
			}
		}

		// Emotion timer.
		if self.emotion != EMOTION_DEFAULT && t_now > self.emotion_end {
			self.emotion = EMOTION_DEFAULT;
		}

		// Blink timer; blinking only interleaves the neutral emotion.
		if self.blinking {
			if t_now > self.blink_end {
				self.blinking = false;
				self.next_blink = t_now + self.rng.random_range(BLINK_INTERVAL_MS);
			}
		} else if self.emotion == EMOTION_DEFAULT && t_now > self.next_blink {
			self.blinking = true;
			self.blink_end = t_now + BLINK_DURATION_MS;
		}
	}

	/// Rolls a random-move substitution when the continuous action has
	/// one; the substitute plays through the one-time slot.
	fn maybe_random_move(&mut self, table: &ActionTable) {
		let action = self.continuous.action;
		if let Some(replacement) = table.random_moves().pick(action, &mut self.rng) {
			self.play_once(replacement);
		}
	}
}

impl std::fmt::Debug for Avatar {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let (action, facing_left) = self.current_action();
		write!(
			f,
			"Avatar(action {action}, frame {}, {}, facing {})",
			self.current_frame(),
			match self.state() {
				PlayState::Idle => "idle",
				PlayState::Playing => "playing",
				PlayState::Repeating => "repeating",
				PlayState::Complete => "complete",
			},
			if facing_left { "left" } else { "right" }
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use maplet_wz::{Node, Value};

	fn table() -> ActionTable {
		let body = Node::image("00002000.img");
		for (name, delays) in [
			("walk1", vec![100, 100]),
			("walk2", vec![100]),
			("stand1", vec![150, 150, 150]),
			("bow", vec![50, 50]),
		] {
			let action = Node::sub_property(name);
			for (i, delay) in delays.iter().enumerate() {
				let frame = Node::sub_property(i.to_string());
				frame.append_child(Node::new("delay", Value::Int(*delay)));
				action.append_child(frame);
			}
			body.append_child(action);
		}
		ActionTable::from_body_image(&body).unwrap()
	}

	fn avatar() -> Avatar {
		Avatar::with_seed(Appearance::default(), 42)
	}

	#[test]
	fn test_move_action_packing() {
		assert_eq!(unpack_move_action(pack_move_action(33, true)), (33, true));
		assert_eq!(unpack_move_action(pack_move_action(0, false)), (0, false));
		assert_eq!(unpack_move_action(5), (2, true));
	}

	#[test]
	fn test_frames_advance_by_delay() {
		let table = table();
		let mut avatar = avatar();
		// stand1 is code 2; packed with direction bit clear.
		avatar.set_move_action(pack_move_action(2, false));

		avatar.update(&table, 0);
		assert_eq!(avatar.current_frame(), 0);
		assert_eq!(avatar.state(), PlayState::Playing);

		avatar.update(&table, 140);
		assert_eq!(avatar.current_frame(), 0);
		avatar.update(&table, 160);
		assert_eq!(avatar.current_frame(), 1);
		avatar.update(&table, 300);
		assert_eq!(avatar.current_frame(), 2);
	}

	#[test]
	fn test_continuous_action_loops() {
		let table = table();
		let mut avatar = avatar();
		avatar.set_move_action(pack_move_action(2, false));
		avatar.update(&table, 0);
		// Past the full 450 ms cycle: wraps to frame 0 and repeats.
		avatar.update(&table, 460);
		avatar.update(&table, 920);
		assert_eq!(avatar.state(), PlayState::Repeating);
		assert_eq!(avatar.current_frame(), 0);
	}

	#[test]
	fn test_one_time_action_falls_back() {
		let table = table();
		let mut avatar = avatar();
		avatar.set_move_action(pack_move_action(2, false));
		avatar.update(&table, 0);

		let bow = table.code_of("bow").unwrap();
		avatar.play_once(bow);
		assert_eq!(avatar.current_action().0, bow);

		avatar.update(&table, 10);
		assert_eq!(avatar.current_action().0, bow);
		// 100 ms exhausts both 50 ms frames.
		avatar.update(&table, 120);
		assert_eq!(avatar.current_action().0, 2);
	}

	#[test]
	fn test_new_one_time_supersedes_previous() {
		let table = table();
		let mut avatar = avatar();
		avatar.set_move_action(pack_move_action(2, false));
		avatar.update(&table, 0);

		let bow = table.code_of("bow").unwrap();
		avatar.play_once(bow);
		avatar.update(&table, 60);
		assert_eq!(avatar.current_frame(), 1);

		// Re-arming resets the slot.
		avatar.play_once(bow);
		avatar.update(&table, 70);
		assert_eq!(avatar.current_frame(), 0);
	}

	#[test]
	fn test_forced_stand_overrides_move() {
		let table = table();
		let mut avatar = avatar();
		avatar.set_move_action(pack_move_action(0, true));
		avatar.force_stand(2);
		assert_eq!(avatar.current_action(), (2, true));

		// A new move action clears the forced stand.
		avatar.set_move_action(pack_move_action(0, true));
		assert_eq!(avatar.current_action(), (0, true));
	}

	#[test]
	fn test_emotion_reverts_at_deadline() {
		let table = table();
		let mut avatar = avatar();
		avatar.update(&table, 0);
		avatar.set_emotion(3, 1000, 0);
		avatar.update(&table, 500);
		assert_eq!(avatar.current_emotion(), 3);
		avatar.update(&table, 1001);
		assert_eq!(avatar.current_emotion(), EMOTION_DEFAULT);
	}

	#[test]
	fn test_blink_cycles() {
		let table = table();
		let mut avatar = avatar();
		// The first tick schedules a blink within the interval bounds.
		avatar.update(&table, 0);
		assert_eq!(avatar.current_emotion(), EMOTION_DEFAULT);

		// Past the upper bound the blink has certainly triggered.
		avatar.update(&table, BLINK_INTERVAL_MS.end + 1);
		assert_eq!(avatar.current_emotion(), EMOTION_BLINK);

		// It releases after its hold time and re-arms for later.
		let release = BLINK_INTERVAL_MS.end + 1 + BLINK_DURATION_MS + 1;
		avatar.update(&table, release);
		assert_eq!(avatar.current_emotion(), EMOTION_DEFAULT);
		avatar.update(&table, release + 100);
		assert_eq!(avatar.current_emotion(), EMOTION_DEFAULT);
	}

	#[test]
	fn test_determinism_with_seed() {
		let table = table();
		let run = || {
			let mut avatar = Avatar::with_seed(Appearance::default(), 7);
			avatar.set_move_action(pack_move_action(2, false));
			let mut trace = Vec::new();
			for t in (0..5000).step_by(97) {
				avatar.update(&table, t);
				trace.push((avatar.current_frame(), avatar.current_emotion()));
			}
			trace
		};
		assert_eq!(run(), run());
	}
}
