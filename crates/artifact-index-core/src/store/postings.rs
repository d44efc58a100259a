//! Sorted, deduplicated postings lists.

use super::DocId;

/// Insert `doc` keeping the list sorted. Returns false if already present.
pub(crate) fn insert_sorted(list: &mut Vec<DocId>, doc: DocId) -> bool {
    match list.binary_search(&doc) {
        Ok(_) => false,
        Err(pos) => {
            list.insert(pos, doc);
            true
        }
    }
}

/// Remove `doc` if present. Returns true when something was removed.
pub(crate) fn remove_sorted(list: &mut Vec<DocId>, doc: DocId) -> bool {
    match list.binary_search(&doc) {
        Ok(pos) => {
            list.remove(pos);
            true
        }
        Err(_) => false,
    }
}

/// Strictly increasing, i.e. sorted with no duplicates.
pub(crate) fn is_strictly_sorted(list: &[DocId]) -> bool {
    list.windows(2).all(|w| w[0] < w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_order_and_dedups() {
        let mut list = Vec::new();
        for d in [5, 1, 3, 3, 9, 1] {
            insert_sorted(&mut list, d);
        }
        assert_eq!(list, vec![1, 3, 5, 9]);
        assert!(is_strictly_sorted(&list));
    }

    #[test]
    fn remove_missing_is_noop() {
        let mut list = vec![1, 2, 3];
        assert!(!remove_sorted(&mut list, 7));
        assert!(remove_sorted(&mut list, 2));
        assert_eq!(list, vec![1, 3]);
    }
}
