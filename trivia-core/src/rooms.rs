use rand::Rng;

pub const ROOM_CODE_LENGTH: usize = 4;

// Excludes 0, O, 1 and I
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_CODE_LENGTH)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Canonical form used for lookups: trimmed and uppercased
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn is_valid_room_code(code: &str) -> bool {
    let code = normalize_room_code(code);
    code.len() == ROOM_CODE_LENGTH && code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_are_valid() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let code = generate_room_code(&mut rng);
            assert!(is_valid_room_code(&code), "bad code {}", code);
        }
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_room_code(" ab3k "), "AB3K");
        assert!(is_valid_room_code("ab3k"));
        assert!(!is_valid_room_code("AB0K"));
        assert!(!is_valid_room_code("ABCDE"));
    }
}
