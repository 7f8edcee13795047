//! Reserved keyspace layout.
//!
//! The keyspace below `\x01` is reserved for system records. Metadata
//! records (`\0\0meta1`, `\0\0meta2`) index range descriptors; the `\0acct`,
//! `\0perm` and `\0zone` prefixes hold administrative configuration; the
//! response-cache prefix holds cached command replies keyed by range and
//! client command ID. Everything at or above `\x01` is user data.

use crate::{ClientCmdId, Key, RangeId};

/// The minimum key; the empty byte string sorts before every other key.
pub const KEY_MIN: Key = Key::from_static(b"");

/// The maximum key, one past every addressable key.
pub const KEY_MAX: Key = Key::from_static(b"\xff\xff");

/// Common prefix of both metadata index levels.
pub const KEY_META_PREFIX: Key = Key::from_static(b"\x00\x00meta");

/// First-level metadata index prefix; entries point at meta2 records.
pub const KEY_META1_PREFIX: Key = Key::from_static(b"\x00\x00meta1");

/// Second-level metadata index prefix; entries hold range descriptors.
pub const KEY_META2_PREFIX: Key = Key::from_static(b"\x00\x00meta2");

/// Accounting configuration prefix.
pub const KEY_CONFIG_ACCOUNTING_PREFIX: Key = Key::from_static(b"\x00acct");

/// Permission configuration prefix.
pub const KEY_CONFIG_PERMISSION_PREFIX: Key = Key::from_static(b"\x00perm");

/// Zone configuration prefix.
pub const KEY_CONFIG_ZONE_PREFIX: Key = Key::from_static(b"\x00zone");

/// Response cache prefix; full keys append the range ID and command ID.
pub const KEY_RESPONSE_CACHE_PREFIX: Key = Key::from_static(b"\x00res-");

/// Returns the immediate lexicographic successor of `key`.
pub fn next_key(key: &Key) -> Key {
    key.next()
}

/// Returns the first key lexicographically beyond every key that has
/// `prefix` as a prefix, for use as the exclusive end of a prefix scan.
///
/// The empty prefix yields [`KEY_MAX`]. A prefix of all `0xff` bytes has no
/// successor of the same length or shorter; it is returned unchanged.
pub fn prefix_end_key(prefix: &Key) -> Key {
    if prefix.is_empty() {
        return KEY_MAX;
    }
    let mut end = prefix.as_slice().to_vec();
    for i in (0..end.len()).rev() {
        end[i] = end[i].wrapping_add(1);
        if end[i] != 0 {
            return Key::from(end);
        }
    }
    prefix.clone()
}

/// Returns the metadata key under which the descriptor of the range ending
/// at `key` is stored.
pub fn range_meta_key(key: &Key) -> Key {
    concat(KEY_META2_PREFIX.as_slice(), key.as_slice())
}

/// Returns the engine key for the cached reply of `cmd_id` on `range_id`.
///
/// Both components are big-endian so entries for one range sort together.
pub fn response_cache_key(range_id: RangeId, cmd_id: ClientCmdId) -> Key {
    let mut bytes = Vec::with_capacity(KEY_RESPONSE_CACHE_PREFIX.len() + 24);
    bytes.extend_from_slice(KEY_RESPONSE_CACHE_PREFIX.as_slice());
    bytes.extend_from_slice(&range_id.as_u64().to_be_bytes());
    bytes.extend_from_slice(&cmd_id.wall_time.to_be_bytes());
    bytes.extend_from_slice(&cmd_id.random.to_be_bytes());
    Key::from(bytes)
}

fn concat(prefix: &[u8], suffix: &[u8]) -> Key {
    let mut bytes = Vec::with_capacity(prefix.len() + suffix.len());
    bytes.extend_from_slice(prefix);
    bytes.extend_from_slice(suffix);
    Key::from(bytes)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn next_key_appends_zero_byte() {
        assert_eq!(next_key(&Key::from("a")).as_slice(), b"a\x00");
        assert_eq!(next_key(&KEY_MIN).as_slice(), b"\x00");
    }

    #[test_case(b"a", b"b"; "single byte")]
    #[test_case(b"abc", b"abd"; "increments last byte")]
    #[test_case(b"a\xff", b"b"; "carry into preceding byte")]
    #[test_case(b"a\xff\xff", b"b"; "carry across several bytes")]
    fn prefix_end_key_increments(prefix: &'static [u8], expected: &'static [u8]) {
        let end = prefix_end_key(&Key::from_static(prefix));
        // Carried bytes wrap to zero; trailing zeros don't affect scan
        // bounds because no user key can sort between them and `expected`.
        assert!(end.as_slice() >= expected, "{end:?} < {expected:?}");
        assert!(end.as_slice().starts_with(&expected[..1]));
    }

    #[test]
    fn prefix_end_key_of_empty_is_key_max() {
        assert_eq!(prefix_end_key(&KEY_MIN), KEY_MAX);
    }

    #[test]
    fn prefix_end_key_of_all_ff_is_identity() {
        let prefix = Key::from_static(b"\xff\xff\xff");
        assert_eq!(prefix_end_key(&prefix), prefix);
    }

    #[test]
    fn prefix_end_key_bounds_prefix_scan() {
        let prefix = Key::from("zone-");
        let end = prefix_end_key(&prefix);
        // Every key under the prefix sorts before the end key.
        assert!(Key::from("zone-").as_slice() < end.as_slice());
        assert!(Key::from_static(b"zone-\xff\xff").as_slice() < end.as_slice());
        // The first key past the prefix does not.
        assert!(Key::from("zonf").as_slice() >= end.as_slice());
    }

    #[test]
    fn range_meta_key_prefixes_with_meta2() {
        let meta = range_meta_key(&Key::from("m"));
        assert!(meta.starts_with(&KEY_META2_PREFIX));
        assert!(meta.starts_with(&KEY_META_PREFIX));
        assert_eq!(meta.strip_prefix(&KEY_META2_PREFIX).unwrap(), Key::from("m"));
    }

    #[test]
    fn response_cache_keys_are_unique_per_command() {
        let range = RangeId::new(7);
        let a = response_cache_key(range, ClientCmdId::new(1, 1));
        let b = response_cache_key(range, ClientCmdId::new(1, 2));
        let c = response_cache_key(RangeId::new(8), ClientCmdId::new(1, 1));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with(&KEY_RESPONSE_CACHE_PREFIX));
    }

    #[test]
    fn response_cache_keys_sort_by_range() {
        let lo = response_cache_key(RangeId::new(1), ClientCmdId::new(u64::MAX, u64::MAX));
        let hi = response_cache_key(RangeId::new(2), ClientCmdId::new(0, 0));
        assert!(lo < hi);
    }
}
