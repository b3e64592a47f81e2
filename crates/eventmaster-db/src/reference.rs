use rand::Rng;

const REFERENCE_PREFIX: &str = "EM-";
const REFERENCE_LEN: usize = 8;
const REFERENCE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Booking references look like `EM-7KQ2M9XD`. Ambiguous glyphs (0/O, 1/I)
/// are left out of the alphabet.
pub fn generate_reference() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..REFERENCE_LEN)
        .map(|_| REFERENCE_CHARSET[rng.random_range(0..REFERENCE_CHARSET.len())] as char)
        .collect();
    format!("{REFERENCE_PREFIX}{suffix}")
}
