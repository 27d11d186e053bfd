/// Number of random bytes behind each paste id.
pub const ID_BYTES: usize = 8;

/// Generate a paste id: 16 lowercase hex chars from the thread-local CSPRNG.
pub fn generate_paste_id() -> String {
    use rand::Rng;
    let mut bytes = [0u8; ID_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Cheap shape check so obviously bogus ids never reach the store.
pub fn looks_like_paste_id(id: &str) -> bool {
    id.len() == ID_BYTES * 2 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
