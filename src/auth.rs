//! Password encoding for the `AUTHORIZE` RPC (C4).

use md5::{Digest, Md5};

use crate::wire::codec::string_to_latin1;

/// The MD5-salted resource marker the daemon embeds in its resource name,
/// e.g. `backend$MD5$3bc5...`.
const MD5_MARKER: &str = "$MD5$";

/// Splits a resource name into its backend part and, if present, the
/// daemon-supplied MD5 salt.
///
/// `"net$MD5$a1b2"` -> `("net", Some("a1b2"))`; `"net"` -> `("net", None)`.
pub fn split_resource(resource: &str) -> (&str, Option<&str>) {
    match resource.find(MD5_MARKER) {
        Some(idx) => (&resource[..idx], Some(&resource[idx + MD5_MARKER.len()..])),
        None => (resource, None),
    }
}

/// Encodes a password for the wire, salting it with MD5 when `salt` is
/// supplied (§4.4).
pub fn encode_password(password: &str, salt: Option<&str>) -> String {
    match salt {
        Some(salt) => md5_salted(salt, password),
        None => password.to_owned(),
    }
}

/// `"$MD5$" || lowercase-hex(md5(salt || password))`, computed over the
/// ISO-8859-1 bytes of `salt` and `password` (daemons only ever send
/// printable-ASCII salts, so this never hits the non-Latin-1 error path).
fn md5_salted(salt: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(string_to_latin1(salt).unwrap_or_else(|_| salt.as_bytes().to_vec()));
    hasher.update(string_to_latin1(password).unwrap_or_else(|_| password.as_bytes().to_vec()));
    let digest = hasher.finalize();
    let mut out = String::with_capacity(MD5_MARKER.len() + digest.len() * 2);
    out.push_str(MD5_MARKER);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_resource_extracts_salt() {
        assert_eq!(split_resource("net$MD5$abcd"), ("net", Some("abcd")));
        assert_eq!(split_resource("net"), ("net", None));
    }

    #[test]
    fn plain_password_passes_through() {
        assert_eq!(encode_password("hunter2", None), "hunter2");
    }

    #[test]
    fn salted_password_is_md5_of_salt_then_password() {
        let encoded = encode_password("hunter2", Some("abcd"));
        assert!(encoded.starts_with("$MD5$"));
        assert_eq!(encoded.len(), "$MD5$".len() + 32);

        let mut hasher = Md5::new();
        hasher.update(b"abcd");
        hasher.update(b"hunter2");
        let expected: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        assert_eq!(encoded, format!("$MD5${expected}"));
    }
}
