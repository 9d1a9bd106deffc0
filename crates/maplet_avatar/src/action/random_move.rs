//! Random move-action substitution.
//!
//! `Etc/RandomMoveAction.img` lists, per action, a set of replacement
//! actions with weights. When the avatar finishes a cycle of an action
//! that has substitutions, the engine may swap in one of the listed
//! replacements, picked by weighted roll.
//!
//! Layout: one child per source action name; each numeric grandchild
//! carries an `action` string and a `prob` integer weight.

use std::collections::HashMap;

use log::warn;
use maplet_wz::Node;
use rand::Rng;

/// One weighted replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomMove {
	/// Replacement action code
	pub action: u16,
	/// Selection weight
	pub probability: i32,
}

/// Action → weighted replacement list.
#[derive(Debug, Clone, Default)]
pub struct RandomMoveTable {
	entries: HashMap<u16, Vec<RandomMove>>,
}

impl RandomMoveTable {
	/// Parses the table, resolving action names through `codes`.
	///
	/// Unknown action names are skipped with a warning; zero and
	/// negative weights are dropped.
	pub fn load(node: &Node, codes: &HashMap<String, u16>) -> Self {
		let mut entries: HashMap<u16, Vec<RandomMove>> = HashMap::new();
		for source in node.children() {
			let Some(&source_code) = codes.get(source.name()) else {
				warn!("random-move source '{}' is not an action", source.name());
				continue;
			};
			let mut moves = Vec::new();
			for option in source.children() {
				let name = option.child("action").map_or(String::new(), |n| n.as_string(""));
				let Some(&action) = codes.get(&name) else {
					warn!(
						"random-move option '{}' under '{}' is not an action",
						name,
						source.name()
					);
					continue;
				};
				let probability = option.child("prob").map_or(0, |n| n.as_int(0));
				if probability <= 0 {
					continue;
				}
				moves.push(RandomMove {
					action,
					probability,
				});
			}
			if !moves.is_empty() {
				entries.insert(source_code, moves);
			}
		}
		Self {
			entries,
		}
	}

	/// Replacement candidates for an action.
	pub fn candidates(&self, action: u16) -> &[RandomMove] {
		self.entries.get(&action).map_or(&[], Vec::as_slice)
	}

	/// True if the action has any substitution.
	pub fn has(&self, action: u16) -> bool {
		self.entries.contains_key(&action)
	}

	/// Number of actions with substitutions.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// True if no substitutions are loaded.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Rolls a weighted replacement for `action`, if it has one.
	pub fn pick(&self, action: u16, rng: &mut impl Rng) -> Option<u16> {
		let moves = self.entries.get(&action)?;
		let total: i32 = moves.iter().map(|m| m.probability).sum();
		if total <= 0 {
			return None;
		}
		let mut roll = rng.random_range(0..total);
		for candidate in moves {
			roll -= candidate.probability;
			if roll < 0 {
				return Some(candidate.action);
			}
		}
		None
	}
}
