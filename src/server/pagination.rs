//! Cursor Pagination
//!
//! Stateless key listing over the store's sorted key space. The cursor is
//! the last key of the previous page; the next page starts strictly after
//! it, so a deleted cursor key never skips a live one. Ordering is byte
//! order; the JSON page renders keys as UTF-8 with replacement characters
//! for anything else.

use serde::Serialize;

use crate::storage::Store;

/// One page of keys with navigation metadata
#[derive(Debug, Clone, Serialize)]
pub struct KeyPage {
    pub keys: Vec<String>,
    pub next_cursor: String,
    pub has_more: bool,
}

/// List up to `limit` keys in ascending byte order, resuming after `cursor`
pub fn paginate_keys(store: &Store, cursor: &str, limit: usize) -> KeyPage {
    let all = store.keys_sorted();

    let start = if cursor.is_empty() {
        0
    } else {
        match all.binary_search_by(|key| key.as_ref().cmp(cursor.as_bytes())) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    };

    let end = (start + limit).min(all.len());
    let keys: Vec<String> = all[start..end]
        .iter()
        .map(|key| String::from_utf8_lossy(key).into_owned())
        .collect();
    let has_more = end < all.len();
    let next_cursor = if has_more {
        keys.last().cloned().unwrap_or_default()
    } else {
        String::new()
    };

    KeyPage {
        keys,
        next_cursor,
        has_more,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn store_with_keys(keys: &[&str]) -> Store {
        let store = Store::new();
        for key in keys {
            store.set(Bytes::from(key.to_string()), Bytes::from_static(b"v"));
        }
        store
    }

    #[test]
    fn test_first_page() {
        let store = store_with_keys(&["a", "b", "c", "d", "e"]);
        let page = paginate_keys(&store, "", 2);

        assert_eq!(page.keys, vec!["a", "b"]);
        assert_eq!(page.next_cursor, "b");
        assert!(page.has_more);
    }

    #[test]
    fn test_resume_after_cursor() {
        let store = store_with_keys(&["a", "b", "c", "d", "e"]);
        let page = paginate_keys(&store, "b", 2);

        assert_eq!(page.keys, vec!["c", "d"]);
        assert_eq!(page.next_cursor, "d");
        assert!(page.has_more);
    }

    #[test]
    fn test_last_page() {
        let store = store_with_keys(&["a", "b", "c", "d", "e"]);
        let page = paginate_keys(&store, "d", 2);

        assert_eq!(page.keys, vec!["e"]);
        assert_eq!(page.next_cursor, "");
        assert!(!page.has_more);
    }

    #[test]
    fn test_deleted_cursor_key_does_not_skip() {
        let store = store_with_keys(&["a", "c", "d"]);

        // Cursor "b" no longer exists; the page still starts at "c"
        let page = paginate_keys(&store, "b", 2);
        assert_eq!(page.keys, vec!["c", "d"]);
        assert!(!page.has_more);
    }

    #[test]
    fn test_empty_store() {
        let store = Store::new();
        let page = paginate_keys(&store, "", 20);

        assert!(page.keys.is_empty());
        assert_eq!(page.next_cursor, "");
        assert!(!page.has_more);
    }

    #[test]
    fn test_cursor_past_end() {
        let store = store_with_keys(&["a", "b"]);
        let page = paginate_keys(&store, "z", 20);

        assert!(page.keys.is_empty());
        assert!(!page.has_more);
    }
}
