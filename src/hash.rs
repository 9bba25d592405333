const HASH_LEN: usize = 16;

/// Short content fingerprint: the first 16 hex digits of the md5 digest.
pub fn content_hash(text: &str) -> String {
    let digest = format!("{:x}", md5::compute(text.as_bytes()));
    digest[..HASH_LEN].to_string()
}
