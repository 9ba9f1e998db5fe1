use crate::storage::{never_crawled, LinkHistory};
use crate::url::LinkKey;

/// Picks the links of one domain that still need fetching
///
/// `history` must be grouped by link tuple (the datastore returns it ordered
/// by subdomain, path, protocol and time). Within a group the newest time is
/// taken as an explicit maximum, so the order of rows inside a group does
/// not matter. A tuple is selected iff its newest time is the never-crawled
/// sentinel. At most `cap` tuples are returned.
pub fn select_segment(history: &[LinkHistory], cap: usize) -> Vec<LinkKey> {
    let sentinel = never_crawled();
    let mut selected = Vec::new();
    let mut start = 0;

    while start < history.len() && selected.len() < cap {
        let key = &history[start].key;
        let mut latest = history[start].time;
        let mut end = start + 1;

        while end < history.len() && history[end].key == *key {
            latest = latest.max(history[end].time);
            end += 1;
        }

        if latest == sentinel {
            selected.push(key.clone());
        }
        start = end;
    }

    selected
}
