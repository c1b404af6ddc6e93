//! Authentication messages and the MD5 digest helpers.

use md5::{Digest, Md5};

use crate::protocol::codec::MessageBuilder;

/// Write a PasswordMessage (cleartext or MD5 hashed password).
pub fn write_password(buf: &mut Vec<u8>, password: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_cstr(password);
    msg.finish();
}

/// Lowercase hex MD5 digest of the concatenated parts.
///
/// Also used to derive statement and portal names.
pub fn md5_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part);
    }
    format!("{:x}", hasher.finalize())
}

/// Compute MD5 password hash.
///
/// PostgreSQL MD5 password format: "md5" + md5(md5(password + username) + salt)
pub fn md5_password(username: &str, password: &str, salt: &[u8; 4]) -> String {
    let first_hash_hex = md5_hex(&[password.as_bytes(), username.as_bytes()]);
    let second_hash_hex = md5_hex(&[first_hash_hex.as_bytes(), salt]);
    format!("md5{second_hash_hex}")
}
