use unicode_segmentation::UnicodeSegmentation;

const PREFIX_CHARS: usize = 5;
const WORD_WEIGHT: f32 = 1.0;
const PREFIX_WEIGHT: f32 = 0.5;
const BIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic local embedder. Features are hashed into signed buckets, so the same text
/// always maps to the same unit vector and related wording shares buckets.
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
	dimensions: usize,
}
impl HashingEmbedder {
	pub fn new(dimensions: usize) -> Self {
		Self { dimensions: dimensions.max(1) }
	}

	pub fn dimensions(&self) -> usize {
		self.dimensions
	}

	pub fn embed(&self, text: &str) -> Vec<f32> {
		let mut vector = vec![0.0_f32; self.dimensions];
		let words = text.unicode_words().map(str::to_lowercase).collect::<Vec<_>>();

		for word in &words {
			self.accumulate(&mut vector, b"w", word, WORD_WEIGHT);

			if word.chars().count() > PREFIX_CHARS {
				let prefix = word.chars().take(PREFIX_CHARS).collect::<String>();

				self.accumulate(&mut vector, b"p", &prefix, PREFIX_WEIGHT);
			}
		}
		for pair in words.windows(2) {
			let bigram = format!("{} {}", pair[0], pair[1]);

			self.accumulate(&mut vector, b"b", &bigram, BIGRAM_WEIGHT);
		}

		let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

		if norm > 0.0 {
			vector.iter_mut().for_each(|value| *value /= norm);
		}

		vector
	}

	pub fn embed_all(&self, texts: &[String]) -> Vec<Vec<f32>> {
		texts.iter().map(|text| self.embed(text)).collect()
	}

	fn accumulate(&self, vector: &mut [f32], kind: &[u8], feature: &str, weight: f32) {
		let mut hasher = blake3::Hasher::new();

		hasher.update(kind);
		hasher.update(b":");
		hasher.update(feature.as_bytes());

		let digest = hasher.finalize();
		let bytes = digest.as_bytes();
		let mut bucket_bytes = [0_u8; 8];

		bucket_bytes.copy_from_slice(&bytes[..8]);

		let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
		let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

		vector[bucket] += sign * weight;
	}
}
