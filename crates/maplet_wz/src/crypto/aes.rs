//! AES-256 block encryption.
//!
//! The archive format only ever *encrypts* with a fixed, well-known key:
//! the keystream used for string obfuscation and canvas scrambling is the
//! AES-OFB ciphertext chain of an expanded initialization vector (see
//! [`super::Keystream`]). Decryption, other key sizes and block modes are
//! never needed, so this module implements exactly one operation: encrypt
//! one 16-byte block under a 32-byte key, 14 rounds.

/// Number of rounds for a 256-bit key
const ROUNDS: usize = 14;

/// Forward S-box
const SBOX: [u8; 256] = [
	0x63, 0x7C, 0x77, 0x7B, 0xF2, 0x6B, 0x6F, 0xC5, 0x30, 0x01, 0x67, 0x2B, 0xFE, 0xD7, 0xAB, 0x76,
	0xCA, 0x82, 0xC9, 0x7D, 0xFA, 0x59, 0x47, 0xF0, 0xAD, 0xD4, 0xA2, 0xAF, 0x9C, 0xA4, 0x72, 0xC0,
	0xB7, 0xFD, 0x93, 0x26, 0x36, 0x3F, 0xF7, 0xCC, 0x34, 0xA5, 0xE5, 0xF1, 0x71, 0xD8, 0x31, 0x15,
	0x04, 0xC7, 0x23, 0xC3, 0x18, 0x96, 0x05, 0x9A, 0x07, 0x12, 0x80, 0xE2, 0xEB, 0x27, 0xB2, 0x75,
	0x09, 0x83, 0x2C, 0x1A, 0x1B, 0x6E, 0x5A, 0xA0, 0x52, 0x3B, 0xD6, 0xB3, 0x29, 0xE3, 0x2F, 0x84,
	0x53, 0xD1, 0x00, 0xED, 0x20, 0xFC, 0xB1, 0x5B, 0x6A, 0xCB, 0xBE, 0x39, 0x4A, 0x4C, 0x58, 0xCF,
	0xD0, 0xEF, 0xAA, 0xFB, 0x43, 0x4D, 0x33, 0x85, 0x45, 0xF9, 0x02, 0x7F, 0x50, 0x3C, 0x9F, 0xA8,
	0x51, 0xA3, 0x40, 0x8F, 0x92, 0x9D, 0x38, 0xF5, 0xBC, 0xB6, 0xDA, 0x21, 0x10, 0xFF, 0xF3, 0xD2,
	0xCD, 0x0C, 0x13, 0xEC, 0x5F, 0x97, 0x44, 0x17, 0xC4, 0xA7, 0x7E, 0x3D, 0x64, 0x5D, 0x19, 0x73,
	0x60, 0x81, 0x4F, 0xDC, 0x22, 0x2A, 0x90, 0x88, 0x46, 0xEE, 0xB8, 0x14, 0xDE, 0x5E, 0x0B, 0xDB,
	0xE0, 0x32, 0x3A, 0x0A, 0x49, 0x06, 0x24, 0x5C, 0xC2, 0xD3, 0xAC, 0x62, 0x91, 0x95, 0xE4, 0x79,
	0xE7, 0xC8, 0x37, 0x6D, 0x8D, 0xD5, 0x4E, 0xA9, 0x6C, 0x56, 0xF4, 0xEA, 0x65, 0x7A, 0xAE, 0x08,
	0xBA, 0x78, 0x25, 0x2E, 0x1C, 0xA6, 0xB4, 0xC6, 0xE8, 0xDD, 0x74, 0x1F, 0x4B, 0xBD, 0x8B, 0x8A,
	0x70, 0x3E, 0xB5, 0x66, 0x48, 0x03, 0xF6, 0x0E, 0x61, 0x35, 0x57, 0xB9, 0x86, 0xC1, 0x1D, 0x9E,
	0xE1, 0xF8, 0x98, 0x11, 0x69, 0xD9, 0x8E, 0x94, 0x9B, 0x1E, 0x87, 0xE9, 0xCE, 0x55, 0x28, 0xDF,
	0x8C, 0xA1, 0x89, 0x0D, 0xBF, 0xE6, 0x42, 0x68, 0x41, 0x99, 0x2D, 0x0F, 0xB0, 0x54, 0xBB, 0x16,
];

/// Round constants for the key schedule (only 7 are reached with Nk = 8)
const RCON: [u8; 7] = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40];

/// AES-256 encryptor with a pre-expanded key schedule.
#[derive(Clone)]
pub struct Aes256 {
	round_keys: [[u8; 16]; ROUNDS + 1],
}

impl Aes256 {
	/// Expands a 32-byte key into the 15 round keys.
	pub fn new(key: &[u8; 32]) -> Self {
		// 60 words of schedule, Nk = 8
		let mut w = [[0u8; 4]; 60];
		for (i, chunk) in key.chunks_exact(4).enumerate() {
			w[i].copy_from_slice(chunk);
		}

		for i in 8..60 {
			let mut temp = w[i - 1];
			if i % 8 == 0 {
				temp.rotate_left(1);
				for byte in &mut temp {
					*byte = SBOX[*byte as usize];
				}
				temp[0] ^= RCON[i / 8 - 1];
			} else if i % 8 == 4 {
				for byte in &mut temp {
					*byte = SBOX[*byte as usize];
				}
			}
			for j in 0..4 {
				w[i][j] = w[i - 8][j] ^ temp[j];
			}
		}

		let mut round_keys = [[0u8; 16]; ROUNDS + 1];
		for (round, rk) in round_keys.iter_mut().enumerate() {
			for col in 0..4 {
				rk[col * 4..col * 4 + 4].copy_from_slice(&w[round * 4 + col]);
			}
		}

		Self {
			round_keys,
		}
	}

	/// Encrypts one 16-byte block in place.
	pub fn encrypt_block(&self, block: &mut [u8; 16]) {
		add_round_key(block, &self.round_keys[0]);
		for round in 1..ROUNDS {
			sub_bytes(block);
			shift_rows(block);
			mix_columns(block);
			add_round_key(block, &self.round_keys[round]);
		}
		sub_bytes(block);
		shift_rows(block);
		add_round_key(block, &self.round_keys[ROUNDS]);
	}
}

impl std::fmt::Debug for Aes256 {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		// Never print key material
		f.write_str("Aes256 {{ .. }}")
	}
}

fn add_round_key(block: &mut [u8; 16], rk: &[u8; 16]) {
	for (b, k) in block.iter_mut().zip(rk.iter()) {
		*b ^= k;
	}
}

fn sub_bytes(block: &mut [u8; 16]) {
	for byte in block.iter_mut() {
		*byte = SBOX[*byte as usize];
	}
}

/// Rotates row `r` of the column-major state left by `r` positions.
fn shift_rows(block: &mut [u8; 16]) {
	for row in 1..4 {
		let mut tmp = [0u8; 4];
		for col in 0..4 {
			tmp[col] = block[((col + row) % 4) * 4 + row];
		}
		for col in 0..4 {
			block[col * 4 + row] = tmp[col];
		}
	}
}

/// Multiplication by x in GF(2^8) modulo the AES polynomial
#[inline]
fn xtime(v: u8) -> u8 {
	(v << 1) ^ (((v >> 7) & 1) * 0x1B)
}

fn mix_columns(block: &mut [u8; 16]) {
	for col in 0..4 {
		let base = col * 4;
		let (s0, s1, s2, s3) = (block[base], block[base + 1], block[base + 2], block[base + 3]);
		let all = s0 ^ s1 ^ s2 ^ s3;
		block[base] = s0 ^ all ^ xtime(s0 ^ s1);
		block[base + 1] = s1 ^ all ^ xtime(s1 ^ s2);
		block[base + 2] = s2 ^ all ^ xtime(s2 ^ s3);
		block[base + 3] = s3 ^ all ^ xtime(s3 ^ s0);
	}
}
