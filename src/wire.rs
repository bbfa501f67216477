//! Bit-exact wire structs for the character-device control operations
//! (spec §6). Internally every identifying string is an owned, unbounded
//! `String` (spec §9 "Bounded path strings": "internally, paths may be
//! variable-length"); these types exist solely at the ioctl boundary, for
//! binary compatibility with existing daemons.

/// Maximum length (including the terminating NUL) of any string field in
/// the wire structs, matching the system's max-path constant.
pub const MAX_PATH: usize = 1024;

/// Truncates `s` to fit in a `MAX_PATH`-sized NUL-terminated buffer,
/// mirroring `original_source`'s `kstrndup`/`strlcpy` call sites, which
/// silently truncate rather than failing a trigger over an oversized
/// string.
fn bounded(s: &str) -> String {
    if s.len() < MAX_PATH {
        s.to_string()
    } else {
        // Truncate on a char boundary so the result stays valid UTF-8.
        let mut end = MAX_PATH - 1;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}

/// Payload of the daemon's "fetch next request" control operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFetch {
    pub id: i32,
    pub from: String,
    pub path: String,
    pub prefix: String,
    pub key: String,
    pub options: String,
}

impl RequestFetch {
    pub(crate) fn new(
        id: u64,
        from: &str,
        path: &str,
        prefix: &str,
        key: &str,
        options: &str,
    ) -> RequestFetch {
        RequestFetch {
            id: id as i32,
            from: bounded(from),
            path: bounded(path),
            prefix: bounded(prefix),
            key: bounded(key),
            options: bounded(options),
        }
    }
}

/// Payload of the daemon's "request done" control operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDone {
    pub id: i32,
    pub error: i32,
    pub wildcards: bool,
}
