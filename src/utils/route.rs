/// Story id from the last non-empty segment of a page path, e.g. `/chat/42`.
pub fn story_id_from_path(path: &str) -> Option<u64> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .and_then(|segment| segment.parse().ok())
}
